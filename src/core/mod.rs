pub mod audio;
pub mod dsp;
pub mod mask;
pub mod splitter;
