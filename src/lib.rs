//! # instrumentalizer-core
//!
//! Splits audio into a "vocal" and an "instrumental" stream with a spectral
//! band mask, and serves the results over a small HTTP API.

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod server;
pub mod service;
pub mod types;

pub use crate::{
    config::{SeparationConfig, ServerConfig},
    core::{
        audio::{load_waveform, read_audio, write_audio},
        dsp::{frequency_of_bin, inverse, normalize, Spectrogram},
        mask::{apply_mask, build_mask, FrequencyMask},
        splitter::{split_file, Splitter},
    },
    error::{Result, SplitError},
    io::progress::{set_split_progress_callback, SplitProgress},
    service::SeparationService,
    types::{AudioData, SeparationResult, SplitOptions, SplitResult, StemPair, Waveform},
};
