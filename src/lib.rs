//! # Intake Scanner
//!
//! Background analysis for a queue of captured content.
//!
//! Work items (links, videos, notes, social posts) live in a remote store.
//! A scan pass pulls the collection, analyzes every item that has no
//! analysis yet through a completion service, and writes the collection
//! back. A second scan flavour asks a search-completion service about a fixed
//! catalog of topics and keeps the latest answer per topic in a local feed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Work-Item    │──▶│ Orchestrator │──▶│ Analyzers    │──▶ completion API
//! │ Store (HTTP) │◀──│  run_pass()  │   │ fetch+prompt │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │ ScanGate (single flight + status)
//!          ┌────────────────┼────────────────┐
//!          ▼                ▼                ▼
//!     ┌─────────┐     ┌──────────┐     ┌───────────┐
//!     │ Daemon  │     │   HTTP   │     │   Intel   │──▶ feed.json / history.json
//!     │  loop   │     │ control  │     │  scanner  │
//!     └─────────┘     └──────────┘     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! intake run                        # one pass over the work-item store
//! intake daemon --interval 60       # keep polling
//! intake serve --with-daemon        # control surface + polling loop
//! intake intel scan --topic 0 4     # refresh two topics in the feed
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`store`] | Work-Item Store client |
//! | [`extract`] | HTML and caption text extraction |
//! | [`fetch`] | Web page and video content fetchers |
//! | [`completion`] | Completion service clients |
//! | [`search`] | Search-completion client for topic scans |
//! | [`prompt`] | Targeted and generic prompt construction |
//! | [`analyzer`] | Per-type analysis profiles |
//! | [`gate`] | Single-flight scan gate and live status |
//! | [`orchestrator`] | Work-item scan passes |
//! | [`feed`] | Feed and history persistence |
//! | [`topics`] | Built-in topic catalog |
//! | [`intel`] | Topic scans |
//! | [`daemon`] | Periodic scan loop |
//! | [`progress`] | CLI progress output |
//! | [`server`] | Control-surface HTTP server |

pub mod analyzer;
pub mod completion;
pub mod config;
pub mod daemon;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod gate;
pub mod intel;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod prompt;
pub mod search;
pub mod server;
pub mod store;
pub mod topics;
