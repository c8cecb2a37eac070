use anyhow::Context;
use clap::{Parser, Subcommand};
use instrumentalizer_core::{
    core::splitter::split_file_with, server::run_server, set_split_progress_callback,
    SeparationConfig, SeparationService, ServerConfig, SplitOptions, SplitProgress, Splitter,
};
use std::{path::PathBuf, process};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "instrumentalizer")]
#[command(about = "Band-mask vocal/instrumental splitter", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP upload service
    Serve {
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        listen: Option<String>,

        #[arg(long)]
        upload_dir: Option<PathBuf>,

        #[arg(long)]
        processed_dir: Option<PathBuf>,
    },

    /// Split a local file
    Split {
        #[arg(short, long)]
        input: String,

        #[arg(short, long, default_value = ".")]
        output: String,

        #[arg(long, default_value_t = 2048)]
        n_fft: usize,

        #[arg(long)]
        hop: Option<usize>,

        #[arg(long, default_value_t = 200.0)]
        freq_min: f32,

        #[arg(long, default_value_t = 3500.0)]
        freq_max: f32,

        /// Resample the input before analysis
        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            config,
            listen,
            upload_dir,
            processed_dir,
        } => handle_serve(config, listen, upload_dir, processed_dir),
        Commands::Split {
            input,
            output,
            n_fft,
            hop,
            freq_min,
            freq_max,
            sample_rate,
            quiet,
        } => handle_split(
            input,
            output,
            SeparationConfig {
                n_fft,
                hop,
                vocal_freq_min: freq_min,
                vocal_freq_max: freq_max,
            },
            sample_rate,
            quiet,
        ),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_serve(
    config: Option<PathBuf>,
    listen: Option<String>,
    upload_dir: Option<PathBuf>,
    processed_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut cfg = ServerConfig::load(config.as_deref()).context("loading configuration")?;
    if let Some(addr) = listen {
        cfg.listen_addr = addr;
    }
    if let Some(dir) = upload_dir {
        cfg.upload_dir = dir;
    }
    if let Some(dir) = processed_dir {
        cfg.processed_dir = dir;
    }

    let service = SeparationService::new(cfg).context("starting separation service")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(run_server(service))?;
    Ok(())
}

fn handle_split(
    input: String,
    output: String,
    separation: SeparationConfig,
    sample_rate: Option<u32>,
    quiet: bool,
) -> anyhow::Result<()> {
    if !std::path::Path::new(&input).exists() {
        anyhow::bail!("Input file not found: {}", input);
    }

    let splitter = Splitter::new(separation.clone())?;

    if !quiet {
        setup_progress_callback();
        eprintln!("🎵 Instrumentalizer");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("Input:     {}", input);
        eprintln!("Output:    {}", output);
        eprintln!(
            "Pass-band: {:.0}–{:.0} Hz (n_fft={}, hop={})",
            separation.vocal_freq_min,
            separation.vocal_freq_max,
            separation.n_fft,
            separation.hop_length()
        );
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!();
    }

    let opts = SplitOptions {
        output_dir: output,
        target_sample_rate: sample_rate,
    };
    let result = split_file_with(&splitter, &input, opts)?;

    if !quiet {
        eprintln!();
        eprintln!("✅ Split completed successfully!");
        eprintln!();
        eprintln!("Output files ({} Hz):", result.sample_rate);
        eprintln!("  🎤 Vocals:       {}", result.vocals_path);
        eprintln!("  🎹 Instrumental: {}", result.instrumental_path);
        eprintln!(
            "  Vocal share of signal: {:.1}%",
            result.report.vocal_share() * 100.0
        );
    } else {
        // Quiet mode: just print paths
        println!("{}", result.vocals_path);
        println!("{}", result.instrumental_path);
    }

    Ok(())
}

fn setup_progress_callback() {
    set_split_progress_callback(|progress| match progress {
        SplitProgress::Stage(stage) => {
            let stage_name = match stage {
                "read_audio" => "Reading audio file",
                "transform" => "Computing spectrogram",
                "mask" => "Applying band mask",
                "reconstruct" => "Reconstructing streams",
                "normalize" => "Normalizing",
                "write_stems" => "Writing stems",
                _ => stage,
            };
            eprintln!("⏳ {}", stage_name);
        }
        SplitProgress::Writing { stem } => {
            eprintln!("💾 Writing {}", stem);
        }
        SplitProgress::Finished => {
            // Reported by handle_split
        }
    });
}
