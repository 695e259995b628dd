use std::thread;
use std::time::{Duration, Instant};

use atelier_contracts::config::VideoConfig;
use atelier_contracts::error::{VideoError, VideoResult};
use atelier_contracts::video::{TaskStatus, VideoOptions, VideoTask, WaitOutcome};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::http::{request_timeout, structured_error_message, truncate_text};

/// Client for the asynchronous image-to-video task service.
pub struct VideoClient {
    config: VideoConfig,
    http: HttpClient,
}

impl VideoClient {
    pub fn new(config: VideoConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        request_timeout(self.config.request_timeout_s)
    }

    pub(crate) fn build_submit_body(
        &self,
        image_url: &str,
        prompt: &str,
        options: &VideoOptions,
    ) -> Value {
        let text = format!("{} {}", prompt.trim(), options.prompt_flags());
        json!({
            "model": self.config.model,
            "content": [
                { "type": "text", "text": text },
                { "type": "image_url", "image_url": { "url": image_url } },
            ],
        })
    }

    /// Creates a task and returns its id. Submissions are never retried.
    pub fn submit(
        &self,
        image_url: &str,
        prompt: &str,
        options: &VideoOptions,
    ) -> VideoResult<String> {
        let body = self.build_submit_body(image_url, prompt, options);
        tracing::info!(
            model = %self.config.model,
            image_url,
            resolution = %options.resolution,
            duration = options.duration,
            "submitting video task"
        );
        let response = self
            .http
            .post(&self.config.base_url)
            .bearer_auth(self.config.api_key.trim())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .timeout(self.timeout())
            .send()
            .map_err(|err| VideoError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let payload = read_json(response)?;
        if !(200..300).contains(&status) {
            let message = payload
                .as_ref()
                .and_then(structured_error_message)
                .unwrap_or_else(|| format!("API error: {status}"));
            tracing::warn!(status, error = %message, "video task rejected");
            return Err(VideoError::Rejected { status, message });
        }
        let task_id = payload
            .as_ref()
            .and_then(|value| value.get("id"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| VideoError::Malformed("submission response has no task id".to_string()))?;
        tracing::info!(task_id, "video task created");
        Ok(task_id.to_string())
    }

    pub fn poll(&self, task_id: &str) -> VideoResult<VideoTask> {
        let url = format!("{}/{}", self.config.base_url, task_id.trim());
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.config.api_key.trim())
            .timeout(self.timeout())
            .send()
            .map_err(|err| VideoError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let payload = read_json(response)?;
        if !(200..300).contains(&status) {
            let message = payload
                .as_ref()
                .and_then(structured_error_message)
                .unwrap_or_else(|| format!("API error: {status}"));
            return Err(VideoError::Query { status, message });
        }
        let payload = payload
            .ok_or_else(|| VideoError::Malformed("task query returned an empty body".to_string()))?;
        Ok(parse_task(task_id, &payload))
    }

    /// Polls until the task settles or `max_wait` elapses. A timeout is not a
    /// failure; the remote task may still complete.
    pub fn await_completion(
        &self,
        task_id: &str,
        max_wait: Duration,
        interval: Duration,
    ) -> VideoResult<WaitOutcome> {
        let started = Instant::now();
        loop {
            let task = self.poll(task_id)?;
            tracing::debug!(task_id, status = %task.status, "video task polled");
            match task.status {
                TaskStatus::Completed => return Ok(WaitOutcome::Completed(task)),
                TaskStatus::Failed => {
                    let message = task
                        .error_message
                        .unwrap_or_else(|| "video generation failed".to_string());
                    return Ok(WaitOutcome::Failed {
                        task_id: task.task_id,
                        message,
                    });
                }
                _ => {}
            }
            let waited = started.elapsed();
            if waited >= max_wait {
                tracing::warn!(task_id, waited_s = waited.as_secs_f64(), "video wait timed out");
                return Ok(WaitOutcome::TimedOut {
                    task_id: task_id.to_string(),
                    waited,
                });
            }
            thread::sleep(interval.min(max_wait - waited));
        }
    }
}

fn read_json(response: HttpResponse) -> VideoResult<Option<Value>> {
    let body = response
        .text()
        .map_err(|err| VideoError::Transport(err.to_string()))?;
    if body.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(&body) {
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(Some(Value::String(truncate_text(&body, 240)))),
    }
}

pub(crate) fn parse_task(requested_id: &str, payload: &Value) -> VideoTask {
    let text_at = |pointer: &str| {
        payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let status = TaskStatus::parse(&text_at("/status").unwrap_or_default());
    let result_url = if status == TaskStatus::Completed {
        text_at("/video_url")
            .or_else(|| text_at("/result/video_url"))
            .or_else(|| text_at("/content/video_url"))
    } else {
        None
    };
    VideoTask {
        task_id: text_at("/id").unwrap_or_else(|| requested_id.trim().to_string()),
        status,
        result_url,
        error_message: text_at("/error_message").or_else(|| text_at("/error/message")),
        created_at: payload.get("created_at").filter(|value| !value.is_null()).cloned(),
        updated_at: payload.get("updated_at").filter(|value| !value.is_null()).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use atelier_contracts::config::VideoConfig;
    use atelier_contracts::error::VideoError;
    use atelier_contracts::video::{TaskStatus, VideoOptions, WaitOutcome};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::{parse_task, VideoClient};
    use crate::test_support::MockHttp;

    fn client(base_url: String) -> VideoClient {
        VideoClient::new(VideoConfig {
            api_key: "ark-key".to_string(),
            base_url,
            model: "seedance-test".to_string(),
            defaults: VideoOptions::default(),
            request_timeout_s: 5.0,
            max_wait_s: 1.0,
            poll_interval_s: 0.01,
        })
    }

    fn task_body(status: &str) -> serde_json::Value {
        json!({ "id": "task-1", "status": status, "created_at": 1725400000 })
    }

    #[test]
    fn task_fields_are_read_from_alternate_locations() {
        let nested = parse_task(
            "task-1",
            &json!({ "status": "succeeded", "content": { "video_url": "https://v/1.mp4" } }),
        );
        assert_eq!(nested.status, TaskStatus::Completed);
        assert_eq!(nested.result_url.as_deref(), Some("https://v/1.mp4"));
        assert_eq!(nested.task_id, "task-1");

        let running = parse_task("task-2", &json!({ "status": "running", "video_url": "https://v/x" }));
        assert_eq!(running.result_url, None);

        let failed = parse_task(
            "task-3",
            &json!({ "status": "failed", "error": { "message": "content filtered" } }),
        );
        assert_eq!(failed.error_message.as_deref(), Some("content filtered"));
    }

    #[test]
    fn submit_sends_flags_and_returns_task_id() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        mock.mount(
            Mock::given(method("POST"))
                .and(path("/tasks"))
                .and(header("authorization", "Bearer ark-key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cgt-42" }))),
        );
        let client = client(format!("{}/tasks", mock.uri()));
        let task_id = client.submit(
            "https://img.example/cat.png",
            "a cat waves",
            &VideoOptions::default(),
        )?;
        assert_eq!(task_id, "cgt-42");

        let sent = mock.received_json();
        assert_eq!(sent[0]["model"], json!("seedance-test"));
        assert_eq!(
            sent[0]["content"][0]["text"],
            json!("a cat waves --resolution 1080p --duration 5 --camerafixed false --watermark true")
        );
        assert_eq!(
            sent[0]["content"][1]["image_url"]["url"],
            json!("https://img.example/cat.png")
        );
        Ok(())
    }

    #[test]
    fn rejected_submit_surfaces_service_message() {
        let mock = MockHttp::start();
        mock.mount(Mock::given(method("POST")).respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "image too small" } })),
        ));
        let client = client(format!("{}/tasks", mock.uri()));
        let err = client
            .submit("https://img/x.png", "p", &VideoOptions::default())
            .expect_err("rejected");
        assert_eq!(
            err,
            VideoError::Rejected {
                status: 400,
                message: "image too small".to_string()
            }
        );

        let bare = MockHttp::start();
        bare.mount(Mock::given(method("POST")).respond_with(ResponseTemplate::new(503)));
        let err = client_for(&bare)
            .submit("https://img/x.png", "p", &VideoOptions::default())
            .expect_err("rejected");
        assert_eq!(err.to_string(), "API error: 503");
    }

    fn client_for(mock: &MockHttp) -> VideoClient {
        client(format!("{}/tasks", mock.uri()))
    }

    #[test]
    fn wait_returns_completed_url() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        mock.mount(
            Mock::given(method("GET"))
                .and(path("/tasks/task-1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "task-1",
                    "status": "succeeded",
                    "content": { "video_url": "https://cdn/v.mp4" },
                }))),
        );
        let outcome = client_for(&mock).await_completion(
            "task-1",
            Duration::from_secs(1),
            Duration::from_millis(10),
        )?;
        match outcome {
            WaitOutcome::Completed(task) => {
                assert_eq!(task.result_url.as_deref(), Some("https://cdn/v.mp4"))
            }
            other => panic!("expected completion, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn wait_keeps_polling_through_unknown_statuses() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        mock.mount(
            Mock::given(method("GET"))
                .and(path("/tasks/task-1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(task_body("warming_up")))
                .up_to_n_times(2)
                .with_priority(1),
        );
        mock.mount(
            Mock::given(method("GET"))
                .and(path("/tasks/task-1"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": "task-1",
                    "status": "completed",
                    "video_url": "https://cdn/done.mp4",
                })))
                .with_priority(2),
        );
        let outcome = client_for(&mock).await_completion(
            "task-1",
            Duration::from_secs(2),
            Duration::from_millis(5),
        )?;
        assert!(matches!(outcome, WaitOutcome::Completed(ref task) if task.result_url.is_some()));
        assert_eq!(mock.received_requests().len(), 3);
        Ok(())
    }

    #[test]
    fn wait_reports_failure_message() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        mock.mount(Mock::given(method("GET")).respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "id": "task-1",
                "status": "failed",
                "error_message": "moderation blocked",
            })),
        ));
        let outcome = client_for(&mock).await_completion(
            "task-1",
            Duration::from_secs(1),
            Duration::from_millis(10),
        )?;
        assert_eq!(
            outcome,
            WaitOutcome::Failed {
                task_id: "task-1".to_string(),
                message: "moderation blocked".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn wait_times_out_while_running() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        mock.mount(
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(200).set_body_json(task_body("running"))),
        );
        let outcome = client_for(&mock).await_completion(
            "task-1",
            Duration::from_millis(60),
            Duration::from_millis(20),
        )?;
        match outcome {
            WaitOutcome::TimedOut { task_id, waited } => {
                assert_eq!(task_id, "task-1");
                assert!(waited >= Duration::from_millis(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn query_error_stops_waiting() {
        let mock = MockHttp::start();
        mock.mount(
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "no such task" }))),
        );
        let err = client_for(&mock)
            .await_completion("missing", Duration::from_secs(1), Duration::from_millis(10))
            .expect_err("query error");
        assert_eq!(
            err,
            VideoError::Query {
                status: 404,
                message: "no such task".to_string()
            }
        );
    }
}
