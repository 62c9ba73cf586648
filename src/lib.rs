//! Learnboard - Personal Learning Resource Tracker
//!
//! Learnboard keeps a signed-in user's learning resources (articles, videos,
//! PDFs, websites) grouped into clusters, tracks progress and notes per
//! resource, and keeps a live view of both collections in sync with the
//! backing document store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         View (CLI)                           │
//! │   render::dashboard ◄── watch<Arc<ViewSnapshot>>             │
//! └───────────────┬──────────────────────────▲───────────────────┘
//!                 │ mutations                │ snapshots
//! ┌───────────────▼───────────┐   ┌──────────┴───────────────────┐
//! │          Tracker          │   │          SyncLayer           │
//! │  create / update / move   │   │  resources ─┐                │
//! │  cascade cluster delete   │   │  clusters  ─┴─► merge        │
//! └───────────────┬───────────┘   └──────────▲───────────────────┘
//!                 │                          │ per-collection watch
//! ┌───────────────▼──────────────────────────┴───────────────────┐
//! │                 DocumentStore (LocalStore)                   │
//! │           users/<uid>/{resources,clusters}/<id>.json         │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲
//!                 │ current user (watch<Option<User>>)
//! ┌───────────────┴──────────────────────────────────────────────┐
//! │        IdentityService (LocalIdentity + federated)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows one way: a mutation goes to the store, the store notifies its
//! subscribers, the sync layer rebuilds the snapshot and the view re-renders.
//!
//! ## Modules
//!
//! - [`identity`]: Accounts, password and federated sign-in
//! - [`store`]: Per-user document collections with live subscriptions
//! - [`resources`]: Resource and cluster types, search, embed viewer
//! - [`sync`]: Live view snapshots for the signed-in user
//! - [`tracker`]: Mutation operations including cascade cluster delete
//! - [`preferences`]: Local dark-mode preference
//! - [`render`]: Text rendering for the CLI
//! - [`config`]: Configuration management

pub mod config;
pub mod error;
pub mod identity;
pub mod preferences;
pub mod render;
pub mod resources;
pub mod store;
pub mod sync;
pub mod tracker;

pub use config::LearnboardConfig;
pub use error::{Error, Result};
