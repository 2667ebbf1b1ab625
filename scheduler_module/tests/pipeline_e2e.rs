use chrono::Utc;
use content_module::{ContentWriter, ImageStore, OpenAiClient, OpenAiConfig};
use mockito::{Matcher, Server};
use publish_module::{LinkedInApiConfig, LinkedInClient};
use scheduler_module::linkedin_auth::TokenSource;
use scheduler_module::pipeline::PostCreationPipeline;
use scheduler_module::{
    PipelineError, Scheduler, SchedulerConfig, TaskCallback, TaskPayload, TaskStatus,
    POST_CREATION_TASK,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const GENERATED_POST: &str =
    "Data quality is the quiet engine behind every good decision we make today. #data";

fn payload(value: serde_json::Value) -> TaskPayload {
    value.as_object().cloned().expect("object payload")
}

fn pipeline(server: &Server, temp: &TempDir, token: Option<&str>, with_writer: bool) -> PostCreationPipeline {
    let writer = with_writer.then(|| {
        let client = OpenAiClient::new(OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: server.url(),
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            ..OpenAiConfig::default()
        })
        .expect("openai client");
        ContentWriter::new(client)
    });
    let publisher = LinkedInClient::new(LinkedInApiConfig {
        base_url: server.url(),
        ..LinkedInApiConfig::default()
    })
    .expect("linkedin client");
    PostCreationPipeline::new(
        writer,
        ImageStore::new(temp.path().join("generated")),
        publisher,
        TokenSource::new(None, token.map(str::to_string)),
    )
}

async fn mock_chat(server: &mut Server, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": GENERATED_POST}}]}).to_string())
        .expect(hits)
        .create_async()
        .await
}

async fn mock_userinfo(server: &mut Server) -> mockito::Mock {
    server
        .mock("GET", "/userinfo")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"sub":"member-1"}"#)
        .create_async()
        .await
}

#[tokio::test]
async fn provided_content_is_published_without_generation() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let chat = mock_chat(&mut server, 0).await;
    let _userinfo = mock_userinfo(&mut server).await;
    let post = server
        .mock("POST", "/ugcPosts")
        .match_header("authorization", "Bearer legacy-token")
        .match_body(Matcher::PartialJson(json!({
            "specificContent": {"com.linkedin.ugc.ShareContent": {
                "shareCommentary": {"text": "Hand written update"},
                "shareMediaCategory": "NONE",
            }},
        })))
        .with_status(201)
        .with_body(r#"{"id":"urn:li:share:1"}"#)
        .expect(1)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("legacy-token"), true);
    pipeline
        .run(&payload(json!({"content": "Hand written update", "generate_image": false})))
        .await?;

    chat.assert_async().await;
    post.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn image_failure_falls_back_to_text_post() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    // One call writes the post, one refines the image prompt.
    let chat = mock_chat(&mut server, 2).await;
    let image = server
        .mock("POST", "/images/generations")
        .with_status(400)
        .with_body("content policy")
        .expect(1)
        .create_async()
        .await;
    let _userinfo = mock_userinfo(&mut server).await;
    let post = server
        .mock("POST", "/ugcPosts")
        .match_body(Matcher::PartialJson(json!({
            "specificContent": {"com.linkedin.ugc.ShareContent": {
                "shareCommentary": {"text": GENERATED_POST},
                "shareMediaCategory": "NONE",
            }},
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("tok"), true);
    pipeline
        .run(&payload(json!({"topic": "Data quality", "style": "concise"})))
        .await?;

    chat.assert_async().await;
    image.assert_async().await;
    post.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn missing_token_rejects_before_publishing() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let userinfo = server
        .mock("GET", "/userinfo")
        .expect(0)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, None, false);
    let err = pipeline
        .run(&payload(json!({"content": "ready to go", "generate_image": false})))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(message) if message.contains("access token")));
    userinfo.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn short_generated_content_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let _chat = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices":[{"message":{"content":"Too short."}}]}"#)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("tok"), true);
    let err = pipeline
        .run(&payload(json!({"topic": "anything"})))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(message) if message.contains("too short")));
    Ok(())
}

#[tokio::test]
async fn publish_failure_is_external() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let _userinfo = mock_userinfo(&mut server).await;
    let _post = server
        .mock("POST", "/ugcPosts")
        .with_status(500)
        .with_body("oops")
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("tok"), false);
    let err = pipeline
        .run(&payload(json!({"content": "hello there"})))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::External(_)));
    Ok(())
}

#[tokio::test]
async fn content_is_required_without_generator() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let server = Server::new_async().await;
    let pipeline = pipeline(&server, &temp, Some("tok"), false);
    let err = pipeline.run(&TaskPayload::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(_)));
    Ok(())
}

#[tokio::test]
async fn scheduled_post_completes_through_scheduler() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let _userinfo = mock_userinfo(&mut server).await;
    let post = server
        .mock("POST", "/ugcPosts")
        .with_status(201)
        .with_body(r#"{"id":"urn:li:share:7"}"#)
        .expect(1)
        .create_async()
        .await;

    let scheduler = Scheduler::new(SchedulerConfig {
        poll_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        retry_delay: Duration::from_millis(20),
        max_retries: 3,
    });
    scheduler.register_callback(
        POST_CREATION_TASK,
        pipeline(&server, &temp, Some("tok"), false),
    );
    scheduler.schedule_task(
        "post-1",
        POST_CREATION_TASK,
        Utc::now() + chrono::Duration::milliseconds(100),
        payload(json!({"content": "Scheduled hello"})),
    )?;
    scheduler.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = scheduler.get_task_status("post-1")?;
        if snapshot.task.status == TaskStatus::Completed {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task never completed: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    scheduler.stop().await;
    post.assert_async().await;
    Ok(())
}

async fn mock_prompt(server: &mut Server, marker: &str, reply: &str, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex(marker.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": reply}}]}).to_string())
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn low_scoring_generated_idea_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let idea = mock_prompt(&mut server, "Generate 1 specific content idea", "Spreadsheets", 1).await;
    let score = mock_prompt(
        &mut server,
        "Evaluate this LinkedIn content idea",
        "Score: 3/10 - Feedback: too vague",
        1,
    )
    .await;
    let post = mock_prompt(&mut server, "Create a professional LinkedIn post", GENERATED_POST, 0).await;
    let userinfo = server
        .mock("GET", "/userinfo")
        .expect(0)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("tok"), true);
    let err = pipeline
        .run(&payload(json!({"generate_image": false})))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(message) if message.contains("3/10")));

    idea.assert_async().await;
    score.assert_async().await;
    post.assert_async().await;
    userinfo.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn well_scoring_generated_idea_is_written_and_published() -> Result<(), Box<dyn std::error::Error>>
{
    let temp = TempDir::new()?;
    let mut server = Server::new_async().await;
    let idea = mock_prompt(&mut server, "Generate 1 specific content idea", "Data quality", 1).await;
    let score = mock_prompt(
        &mut server,
        "Evaluate this LinkedIn content idea",
        "Score: 8/10 - Feedback: timely",
        1,
    )
    .await;
    let written = mock_prompt(&mut server, "Create a professional LinkedIn post", GENERATED_POST, 1).await;
    let _userinfo = mock_userinfo(&mut server).await;
    let post = server
        .mock("POST", "/ugcPosts")
        .match_body(Matcher::PartialJson(json!({
            "specificContent": {"com.linkedin.ugc.ShareContent": {
                "shareCommentary": {"text": GENERATED_POST},
            }},
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let pipeline = pipeline(&server, &temp, Some("tok"), true);
    pipeline
        .run(&payload(json!({"generate_image": false})))
        .await?;

    idea.assert_async().await;
    score.assert_async().await;
    written.assert_async().await;
    post.assert_async().await;
    Ok(())
}
