//! Typed response models for the in-container automation server.
//!
//! These mirror the JSON payloads of the server's HTTP surface; the
//! capability client deserializes into them and nothing else in the crate
//! interprets response bodies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Error,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub returncode: i32,
}

/// One node of a remote directory listing; directories carry children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// "file" or "directory".
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub children: Option<Vec<DirectoryNode>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryTreeResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
    pub path: String,
    pub tree: DirectoryNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenSizeResponse {
    #[serde(default)]
    pub status: Status,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSizeResponse {
    #[serde(default)]
    pub status: Status,
    pub width: u32,
    pub height: u32,
    pub is_active: bool,
    pub window_id: String,
    #[serde(default)]
    pub window_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesktopPathResponse {
    #[serde(default)]
    pub status: Status,
    pub desktop_path: String,
    pub is_writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformResponse {
    #[serde(default)]
    pub status: Status,
    pub platform: String,
    pub version: String,
    pub architecture: String,
    pub machine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPositionResponse {
    #[serde(default)]
    pub status: Status,
    pub x: i32,
    pub y: i32,
    /// Screen number for multi-monitor setups.
    #[serde(default)]
    pub screen: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalOutputResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibilityTreeResponse {
    #[serde(default)]
    pub status: Status,
    /// Accessibility tree in XML form.
    pub at: String,
    pub platform: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingResponse {
    #[serde(default)]
    pub status: Status,
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowInfoResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub window_id: Option<String>,
    #[serde(default)]
    pub window_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowListResponse {
    #[serde(default)]
    pub status: Status,
    pub windows: Vec<WindowInfoResponse>,
}
