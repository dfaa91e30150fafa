mod args;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use args::{Args, Command};
use reelsmith::collab::{PatchGenerator, ScriptGenerator};
use reelsmith::compositor::{CompositionAssets, compose_final_video};
use reelsmith::config::Config;
use reelsmith::llm::OllamaClient;
use reelsmith::patch::{Strictness, load_patch, merge};
use reelsmith::pipeline;
use reelsmith::spec::SceneSpec;
use reelsmith::subtitle::generate_subtitles;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    match args.command {
        Command::Merge {
            spec,
            patch,
            strict,
            out,
            summary,
        } => {
            let base = load_spec(&spec)?;
            let doc = load_patch(&patch)
                .with_context(|| format!("failed to read patch {}", patch.display()))?;
            let strictness = if strict {
                Strictness::Strict
            } else {
                Strictness::Lenient
            };
            let (merged, report) = merge(&base, &doc, strictness)?;
            let out = out.unwrap_or(spec);
            merged.save(&out)?;
            info!(
                "Merged spec written to {} (changed: {:?})",
                out.display(),
                report.changed_scenes
            );
            if summary {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Command::Subtitles { alignment, out } => {
            cfg.validate()?;
            generate_subtitles(&alignment, &out, &cfg)?;
        }

        Command::Compose {
            spec,
            images,
            narration,
            subtitles,
            out,
            bgm,
            work_dir,
            workers,
        } => {
            if let Some(workers) = workers {
                cfg.video.workers = workers;
            }
            if bgm.is_some() {
                cfg.bgm.enabled = true;
            }
            cfg.validate()?;
            let spec = load_spec(&spec)?;
            let assets = CompositionAssets {
                images_dir: images,
                narration,
                subtitles,
                bgm,
                work_dir,
                out_path: out,
            };
            let path = compose_final_video(&spec, &assets, &cfg)
                .await
                .context("composition failed")?;
            info!("Done: {}", path.display());
        }

        Command::Feedback {
            spec,
            feedback,
            out,
        } => {
            let spec = load_spec(&spec)?;
            let text = std::fs::read_to_string(&feedback)
                .with_context(|| format!("failed to read feedback {}", feedback.display()))?;
            let patch = OllamaClient::new(cfg.llm.clone())
                .generate_patch(&spec, &text)
                .await?;
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&out, serde_yaml::to_string(&patch)?)?;
            info!("Patch written to {}", out.display());
        }

        Command::Script { brief, out } => {
            let idea = std::fs::read_to_string(&brief)
                .with_context(|| format!("failed to read brief {}", brief.display()))?;
            let spec = OllamaClient::new(cfg.llm.clone())
                .generate_script(&idea)
                .await?;
            spec.save(&out)?;
            info!(
                "Script with {} scenes written to {}",
                spec.scenes.len(),
                out.display()
            );
        }

        Command::Run { root } => {
            cfg.validate()?;
            info!("Starting pipeline in {}", root.display());
            let path = pipeline::run_default(&root, &cfg)
                .await
                .context("pipeline failed")?;
            info!("Final output: {}", path.display());
        }
    }

    Ok(())
}

fn load_spec(path: &Path) -> anyhow::Result<SceneSpec> {
    SceneSpec::load(path).with_context(|| format!("failed to load spec {}", path.display()))
}
