//! genstudio: prompt-driven article, image and video generation.
//!
//! A [`Studio`] owns one HTTP client and a provider per backend: Gemini for
//! grounded articles, hosted Gradio spaces (or Hugging Face / Gemini) for
//! images, and a Zeroscope space for short videos. Every call goes through the
//! same backoff executor, and article HTML can be converted to and from plain
//! text for editing.
//!
//! # Quick Start
//!
//! ```no_run
//! use genstudio::prelude::*;
//!
//! # async fn example() -> genstudio::error::Result<()> {
//! let config = StudioConfig::from_env();
//! let studio = Studio::from_config(&config, StudioOptions::default())?;
//!
//! let result = studio.submit(&GenerationRequest::article("Tide pools")).await?;
//! if let Some(html) = result.html() {
//!     println!("{}", genstudio::content::to_plain_text(html));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod studio;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use studio::{Studio, StudioOptions};
