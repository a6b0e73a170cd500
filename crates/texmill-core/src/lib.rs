//! # texmill Core
//!
//! Shared infrastructure for the texmill build tools.
//!
//! ## Overview
//!
//! Every texmill operation treats the TeX toolchain as opaque, slow and
//! fallible. This crate holds the narrow contracts the rest of the workspace
//! talks to that toolchain through:
//!
//! - [`process`] - the [`CommandRunner`](process::CommandRunner) trait and its
//!   `tokio::process` implementation (no shell, timeouts, partial output)
//! - [`toolchain`] - engines, the [`ToolResolver`](toolchain::ToolResolver)
//!   trait and concurrent version probing
//! - [`policy`] - workspace containment and the shell-escape gate
//! - [`config`] - defaults, `.texmill.json` and environment overrides
//! - [`pool`] - bounded-concurrency fan-out for per-file tool runs
//!
//! ## Design Philosophy
//!
//! - **Mockable boundaries**: executables are resolved and run through traits,
//!   so orchestration can be tested without a TeX distribution
//! - **Degrade, don't fail**: only policy violations and programming errors
//!   surface as [`Error`]; tool failures become structured results upstream
//!
//! ## Example
//!
//! ```no_run
//! use texmill_core::process::{CommandRunner, RunOptions, TokioRunner};
//! use texmill_core::toolchain::{ToolResolver, WhichResolver};
//! use std::time::Duration;
//!
//! # async fn demo() -> texmill_core::Result<()> {
//! let exe = WhichResolver.resolve_or_name("pdflatex");
//! let out = TokioRunner
//!     .run(&exe, &["--version".to_string()], &RunOptions::with_timeout(Duration::from_secs(2)))
//!     .await?;
//! println!("{}", out.stdout);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod paths;
pub mod policy;
pub mod pool;
pub mod process;
pub mod toolchain;

pub use config::Config;
pub use error::{Error, Result};
pub use policy::WorkspacePolicy;
pub use toolchain::{Engine, Interaction};
