//! tmux integration: the CLI wrapper and the session/window/pane manager.

pub mod client;
pub mod session;

pub use client::{tmux_installed, Multiplexer, PaneInfo, TmuxClient, WindowInfo};
pub use session::{
    parse_issue_window, session_name, session_slug, window_name, IssueWindow, SessionManager,
    SessionRef, WindowRef, SESSION_PREFIX,
};
