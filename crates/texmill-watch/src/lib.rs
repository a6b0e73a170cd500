//! # texmill Watch
//!
//! Long-lived `latexmk -pvc` sessions.
//!
//! A [`WatchRegistry`] owns every session of the process. Each session has a
//! single state transition: it starts `running` and flips to not running when
//! its process exits for any reason. Only [`WatchRegistry::stop`] removes a
//! session, whether or not its process is still alive.
//!
//! Output from both streams of the child is appended line by line to a
//! [`LogRing`], which keeps the most recent lines only.
//!
//! ```no_run
//! use texmill_build::CompileRequest;
//! use texmill_watch::WatchRegistry;
//!
//! # async fn demo() -> texmill_core::Result<()> {
//! let registry = WatchRegistry::default();
//! let info = registry.start(&CompileRequest::new("thesis/main.tex"))?;
//! for line in registry.tail(&info.id, Some(20))? {
//!     println!("{}", line);
//! }
//! registry.stop(&info.id);
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod ring;

pub use registry::{WatchInfo, WatchRegistry, DEFAULT_TAIL_LINES};
pub use ring::LogRing;
