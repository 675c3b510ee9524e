// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control socket protocol: frame shapes and LF-delimited wire framing
//! (spec.md §4.2).

pub mod wire;

use serde::{Deserialize, Serialize};

/// One incoming frame. A required `type` field selects the variant;
/// unrecognised types land in `Unknown` rather than failing to parse
/// (spec.md's Design Note on explicit event-union dispatch).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    // Events (fire-and-forget)
    SessionStart {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    SessionEnd {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    Checkpoint {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        context: Option<serde_json::Value>,
    },
    StepStarted {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    StepCompleted {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    StepBlocked {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    TaskStarted {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    TaskCompleted {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
    },
    AttentionNeeded {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Question {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    StatusRequest,
    ToolUse {
        #[serde(rename = "sessionId", default)]
        session_id: Option<String>,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },

    // Dispatch commands (request/response)
    ListWorkers,
    Dispatch {
        #[serde(rename = "targetSessionId")]
        target_session_id: String,
        message: String,
    },
    Route {
        query: String,
        message: String,
    },
    CreateWorker {
        repo: String,
        #[serde(rename = "repoPath")]
        repo_path: String,
        #[serde(rename = "taskId", default)]
        task_id: Option<String>,
        #[serde(rename = "claudeFlags", default)]
        claude_flags: Option<String>,
    },
    DiscoverProjects {
        #[serde(default)]
        path: Option<String>,
    },

    #[serde(other)]
    Unknown,
}

impl Frame {
    /// True for the fire-and-forget event variants (spec.md §4.2
    /// "Events"); false for dispatch commands and `Unknown`.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Frame::SessionStart { .. }
                | Frame::SessionEnd { .. }
                | Frame::Checkpoint { .. }
                | Frame::StepStarted { .. }
                | Frame::StepCompleted { .. }
                | Frame::StepBlocked { .. }
                | Frame::TaskStarted { .. }
                | Frame::TaskCompleted { .. }
                | Frame::AttentionNeeded { .. }
                | Frame::Question { .. }
                | Frame::StatusRequest
                | Frame::ToolUse { .. }
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::SessionStart { .. } => "session_start",
            Frame::SessionEnd { .. } => "session_end",
            Frame::Checkpoint { .. } => "checkpoint",
            Frame::StepStarted { .. } => "step_started",
            Frame::StepCompleted { .. } => "step_completed",
            Frame::StepBlocked { .. } => "step_blocked",
            Frame::TaskStarted { .. } => "task_started",
            Frame::TaskCompleted { .. } => "task_completed",
            Frame::AttentionNeeded { .. } => "attention_needed",
            Frame::Question { .. } => "question",
            Frame::StatusRequest => "status_request",
            Frame::ToolUse { .. } => "tool_use",
            Frame::ListWorkers => "list_workers",
            Frame::Dispatch { .. } => "dispatch",
            Frame::Route { .. } => "route",
            Frame::CreateWorker { .. } => "create_worker",
            Frame::DiscoverProjects { .. } => "discover_projects",
            Frame::Unknown => "unknown",
        }
    }
}

/// A worker's public inventory entry for `list_workers`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "taskId")]
    pub task_id: Option<String>,
    #[serde(rename = "lastActivity")]
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// One response line. Every field but `status` is optional: events get
/// `{status, received}`; dispatch commands fill in whichever of the
/// rest apply to that command.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Response {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambiguous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<WorkerSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repos: Option<Vec<String>>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            ..Default::default()
        }
    }

    pub fn event_ack(type_name: &str) -> Self {
        Self {
            status: "ok".to_string(),
            received: Some(type_name.to_string()),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}
