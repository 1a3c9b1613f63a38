use anyhow::Result;
use clap::{Parser, Subcommand};
use regie::compiler::core::Compiler;
use regie::compiler::loader::load_cutscene_from_yaml;
use regie::payloads::{PayloadRegistry, register_builtins};
use regie::runtime::director::Director;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cutscene files in a fixed-rate frame loop
    Run {
        /// Cutscene YAML files to install
        #[arg(long, short)]
        file: Vec<PathBuf>,

        /// Cutscene id to start (defaults to the first file's id)
        #[arg(long)]
        play: Option<String>,

        /// Frame rate of the cooperative loop
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Fire a global skip after this many frames
        #[arg(long)]
        skip_after: Option<u64>,

        /// Safety cap on total frames
        #[arg(long, default_value_t = 100_000)]
        max_frames: u64,

        /// Initial variables (key=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, serde_json::Value)>,
    },

    /// Compile cutscene files and report problems without running them
    Check {
        /// Cutscene YAML files to check
        #[arg(long, short)]
        file: Vec<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, serde_json::Value), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].to_string();
    let val_str = &s[pos + 1..];
    // Try parsing as JSON, otherwise treat as string
    let val = serde_json::from_str(val_str)
        .unwrap_or_else(|_| serde_json::Value::String(val_str.to_string()));
    Ok((key, val))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            play,
            fps,
            skip_after,
            max_frames,
            vars,
        } => {
            let mut director = Director::new();
            register_builtins(director.payload_registry_mut());

            let mut first_id = None;
            for path in &file {
                let doc = load_cutscene_from_yaml(&path.to_string_lossy())?;
                if first_id.is_none() {
                    first_id = Some(doc.id.clone());
                }
                director.context().seed(doc.variables.clone());
                director.install(doc)?;
                info!(file = %path.display(), "Installed cutscene");
            }

            for (k, v) in vars {
                director.context().set_var(&k, v);
            }

            let play_id = play
                .or(first_id)
                .ok_or_else(|| anyhow::anyhow!("No cutscene files given"))?;
            let playback_id = director.start(&play_id)?;
            info!(cutscene = %play_id, playback_id = %playback_id, "Playback started");

            let dt = 1.0 / fps as f32;
            let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
            let mut last_mode = director.compute_mode();
            let mut frame = 0u64;

            while director.active_count() > 0 {
                interval.tick().await;
                frame += 1;
                if frame > max_frames {
                    error!(max_frames, "Frame cap reached, killing all playbacks");
                    director.kill_all();
                    break;
                }
                if skip_after == Some(frame) {
                    info!("Global skip requested");
                    director.skip_all_blocking();
                }
                director.tick_all(dt);

                let mode = director.compute_mode();
                if mode != last_mode {
                    info!(?mode, frame, "Mode changed");
                    last_mode = mode;
                }
            }

            info!(frames = frame, "All playbacks finished");
            for (k, v) in director.context().all_vars() {
                info!("  {} = {}", k, v);
            }
        }

        Commands::Check { file } => {
            let mut registry = PayloadRegistry::new();
            register_builtins(&mut registry);

            let mut failures = 0usize;
            for path in &file {
                match load_cutscene_from_yaml(&path.to_string_lossy()) {
                    Ok(doc) => match Compiler::new().compile(doc, &registry) {
                        Ok(sheet) => {
                            info!(
                                file = %path.display(),
                                id = %sheet.id,
                                nodes = sheet.len(),
                                "OK"
                            );
                        }
                        Err(e) => {
                            failures += 1;
                            error!(file = %path.display(), error = %e, "Compile failed");
                        }
                    },
                    Err(e) => {
                        failures += 1;
                        error!(file = %path.display(), error = %e, "Load failed");
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} file(s) failed to check", failures);
            }
        }
    }

    Ok(())
}
