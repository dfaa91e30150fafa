use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "reelsmith", version, about = "Scene-spec driven short-form video builder")]
pub struct Args {
    /// YAML config file; missing sections take their defaults.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a patch file to a scene spec.
    Merge {
        #[clap(long)]
        spec: PathBuf,

        #[clap(long)]
        patch: PathBuf,

        /// Fail on the first rejected edit instead of skipping it.
        #[clap(long)]
        strict: bool,

        /// Defaults to overwriting --spec.
        #[clap(long)]
        out: Option<PathBuf>,

        /// Print the merge summary as JSON on stdout.
        #[clap(long)]
        summary: bool,
    },

    /// Build a karaoke ASS file from word-alignment JSON.
    Subtitles {
        #[clap(long)]
        alignment: PathBuf,

        #[clap(long, default_value = "build/subtitles/subtitles.ass")]
        out: PathBuf,
    },

    /// Composite images, narration and subtitles into the final video.
    Compose {
        #[clap(long)]
        spec: PathBuf,

        /// Directory holding `<scene id>.png`.
        #[clap(long, default_value = "build/images")]
        images: PathBuf,

        #[clap(long, default_value = "build/audio/audio.wav")]
        narration: PathBuf,

        #[clap(long, default_value = "build/subtitles/subtitles.ass")]
        subtitles: PathBuf,

        #[clap(long, default_value = "build/final.mp4")]
        out: PathBuf,

        /// Mix this track under the narration.
        #[clap(long)]
        bgm: Option<PathBuf>,

        #[clap(long, default_value = "build/compose")]
        work_dir: PathBuf,

        /// Concurrent scene renders.
        #[clap(long)]
        workers: Option<usize>,
    },

    /// Ask the LLM for a patch implementing free-text feedback.
    Feedback {
        #[clap(long)]
        spec: PathBuf,

        #[clap(long, default_value = "feedback.txt")]
        feedback: PathBuf,

        #[clap(long, default_value = "build/video_patch.yaml")]
        out: PathBuf,
    },

    /// Ask the LLM for a fresh scene spec from a video idea.
    Script {
        /// Text file with the idea.
        #[clap(long, default_value = "script_prompt.txt")]
        brief: PathBuf,

        #[clap(long, default_value = "video.yaml")]
        out: PathBuf,
    },

    /// Full pipeline over a project directory.
    Run {
        #[clap(long, default_value = ".")]
        root: PathBuf,
    },
}
