//! Generation client and acquisition pipeline.
//!
//! [`GenerationClient`] turns a prompt into a short-lived provider URL;
//! [`AcquisitionPipeline`] downloads that URL and either returns it inline for
//! preview or commits it into a [`FileStore`](artgen_contracts::storage::FileStore).

mod client;
mod fetch;
mod pipeline;
mod provider;
#[cfg(test)]
mod testing;

pub use client::GenerationClient;
pub use fetch::{FetchedImage, HttpFetcher, ImageFetcher, DEFAULT_MAX_DOWNLOAD_BYTES};
pub use pipeline::{AcquisitionPipeline, FolderEntry, InlineImage, MAX_FOLDER_DEPTH};
pub use provider::{
    ImageProvider, OpenAiProvider, OpenAiSettings, DEFAULT_OPENAI_API_BASE, DEFAULT_OPENAI_MODEL,
    DEFAULT_OPENAI_QUALITY,
};
