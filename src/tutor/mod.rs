//! Tutoring dialogue core and its HTTP service.
//!
//! ## Overview
//!
//! A student chats with a text-completion oracle about a STEM topic. When they
//! say they are ready, the service generates five self-assessment questions,
//! collects answers over as many turns as it takes, grades them, and returns
//! to free chat. The conversation phase is never stored: each turn re-derives
//! it from marker messages in the log.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │                                        │
//!                       │         │ TurnEngine::handle_user_turn()         │
//!                       │         v                                        │
//!                       │  engine.rs  (dispatch, ConversationLocks)        │
//!                       │     ├─ classifier.rs  (on/off topic gate)        │
//!                       │     ├─ phase.rs       (Transcript, derive_phase) │
//!                       │     ├─ readiness.rs   (material or questions)    │
//!                       │     └─ reconciler.rs  (answers → grading)        │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `models`   | Shared types: `Message`, `Conversation`, `TurnReply`    |
//! | `markers`  | `Marker` enum, the only home of the sentinel strings    |
//! | `db`       | SQLite access via `DbHandle`; `MessageLog` trait        |
//! | `oracle`   | `Oracle` trait + OpenAI-compatible client               |
//! | `prompts`  | Prompt templates and fixed reply texts                  |
//!
//! ## Typical Turn
//!
//! 1. `POST /api/conversations/{id}/messages` → `api::send_message()`
//! 2. The engine takes the conversation's lock, then classifies the topic
//!    while persisting the user's message.
//! 3. Off-topic messages get a redirect. Otherwise the phase is derived from
//!    the full log and the turn goes to the reconciler (answers in progress),
//!    the readiness prober (free chat), or plain chat.
//! 4. The branch appends exactly one reply-bearing message plus any markers,
//!    and that message is returned as `{response: {content, role}}`.

pub mod api;
pub mod classifier;
pub mod db;
pub mod engine;
pub mod markers;
pub mod models;
pub mod oracle;
pub mod phase;
pub mod prompts;
pub mod readiness;
pub mod reconciler;
pub mod server;

#[cfg(test)]
mod testing;
