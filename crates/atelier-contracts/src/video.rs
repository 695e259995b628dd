use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Processing,
    Completed,
    Failed,
    Unknown(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "processing" => TaskStatus::Processing,
            "completed" | "succeeded" => TaskStatus::Completed,
            "failed" | "cancelled" | "canceled" => TaskStatus::Failed,
            "" => TaskStatus::Unknown("unknown".to_string()),
            other => TaskStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTask {
    pub task_id: String,
    pub status: TaskStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Option<serde_json::Value>,
    pub updated_at: Option<serde_json::Value>,
}

/// Longest clip, in seconds, a submission may request.
pub const MAX_VIDEO_DURATION_S: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    pub resolution: String,
    pub duration: u32,
    pub camera_fixed: bool,
    pub watermark: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            resolution: "1080p".to_string(),
            duration: 5,
            camera_fixed: false,
            watermark: true,
        }
    }
}

impl VideoOptions {
    /// Parameter flags appended to the text prompt of a submission.
    pub fn prompt_flags(&self) -> String {
        format!(
            "--resolution {} --duration {} --camerafixed {} --watermark {}",
            self.resolution, self.duration, self.camera_fixed, self.watermark
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed(VideoTask),
    Failed { task_id: String, message: String },
    /// The caller stopped waiting; the remote task may still finish.
    TimedOut { task_id: String, waited: Duration },
}

#[cfg(test)]
mod tests {
    use super::{TaskStatus, VideoOptions};

    #[test]
    fn status_strings_map_onto_states() {
        assert_eq!(TaskStatus::parse("queued"), TaskStatus::Pending);
        assert_eq!(TaskStatus::parse("RUNNING"), TaskStatus::Running);
        assert_eq!(TaskStatus::parse("processing"), TaskStatus::Processing);
        assert_eq!(TaskStatus::parse("succeeded"), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("canceled"), TaskStatus::Failed);
        assert_eq!(
            TaskStatus::parse("warming_up"),
            TaskStatus::Unknown("warming_up".to_string())
        );
        assert_eq!(TaskStatus::parse("").as_str(), "unknown");
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Unknown("mystery".to_string()).is_terminal());
    }

    #[test]
    fn default_options_render_prompt_flags() {
        assert_eq!(
            VideoOptions::default().prompt_flags(),
            "--resolution 1080p --duration 5 --camerafixed false --watermark true"
        );
    }
}
