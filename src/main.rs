use avifit::config::{self, Settings};
use avifit::imaging::AvifCodec;
use avifit::log::RunLog;
use avifit::output;
use avifit::pipeline::{RunEvent, RunSummary, Runner};
use avifit::sink::{FilesystemSink, MemorySink, ResultSink};
use avifit::source::InputSource;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// File name used when several converted images are packaged together.
const ARCHIVE_NAME: &str = "avif_images.zip";

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "avifit")]
#[command(about = "Convert images to AVIF at a target file size")]
#[command(long_about = "\
Convert images to AVIF at a target file size

For every image, the AVIF encoder quality is binary-searched until the output
is as close as possible to the target size (within the tolerance, if it can be
reached in the allowed number of attempts).

Accepted inputs: png, jpg, jpeg, webp, bmp.

  avifit convert photos/                 # writes photos/avif/...
  avifit --target-kb 250 convert photos/ --subfolder web
  avifit files a.png b.jpg --out out/    # writes out/avif_images.zip
  avifit archive upload.zip --out out/

Settings are read from avifit.toml (see 'avifit gen-config'); flags override
the file. Every run rewrites the run log (conversion.log by default).")]
#[command(version = version_string())]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "avifit.toml", global = true)]
    config: PathBuf,

    /// Target size per image in KB
    #[arg(long, global = true)]
    target_kb: Option<u64>,

    /// Accepted distance from the target in KB
    #[arg(long, global = true)]
    tolerance_kb: Option<u64>,

    /// Encode attempts per image (5-15)
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    /// Encoder error metric
    #[arg(long, global = true, value_parser = ["mse", "ssim"])]
    quality_mode: Option<String>,

    /// Keep the original base name (extension still becomes .avif)
    #[arg(long, global = true)]
    keep_original_name: bool,

    /// Only convert images directly inside the input
    #[arg(long, global = true)]
    no_recursive: bool,

    /// Also convert files and directories starting with '.'
    #[arg(long, global = true)]
    include_hidden: bool,

    /// Run log location
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Parallel conversion workers (capped at the number of cores)
    #[arg(long, short = 'j', global = true)]
    jobs: Option<usize>,

    /// Print the run summary as JSON instead of progress lines
    #[arg(long, global = true)]
    json: bool,

    /// Print the run log after the run
    #[arg(long, global = true)]
    show_log: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert every image under a directory, mirroring its structure
    Convert {
        /// Input directory
        dir: PathBuf,
        /// Output folder created inside the input directory
        #[arg(long)]
        subfolder: Option<String>,
    },
    /// Convert individual files
    Files {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Where the result (single image or zip) is written
        #[arg(long)]
        out: PathBuf,
    },
    /// Convert the images inside a zip archive
    Archive {
        archive: PathBuf,
        /// Where the result (single image or zip) is written
        #[arg(long)]
        out: PathBuf,
    },
    /// Print a stock avifit.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "avifit=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let settings = load_settings(&cli)?;
    let conversion = settings.conversion_config()?;
    let options = settings.source_options();
    let threads = config::effective_threads(&settings.processing);
    let mut log = RunLog::with_file(&settings.log.file);
    let codec = AvifCodec::new();

    let (source, mut sink, out_dir): (InputSource, Box<dyn ResultSink>, Option<PathBuf>) =
        match &cli.command {
            Command::Convert { dir, .. } => {
                let output_root = dir.join(&settings.output.subfolder);
                (
                    InputSource::Directory(dir.clone()),
                    Box::new(FilesystemSink::new(output_root)),
                    None,
                )
            }
            Command::Files { files, out } => (
                InputSource::Files(files.clone()),
                Box::new(MemorySink::new()),
                Some(out.clone()),
            ),
            Command::Archive { archive, out } => (
                InputSource::Archive(std::fs::read(archive)?),
                Box::new(MemorySink::new()),
                Some(out.clone()),
            ),
            Command::GenConfig => return Ok(()),
        };

    let (tx, rx) = mpsc::channel::<RunEvent>();
    let show_progress = !cli.json;
    let printer = std::thread::spawn(move || {
        for event in rx {
            if show_progress {
                for line in output::format_event(&event) {
                    println!("{line}");
                }
            }
        }
    });
    let result = Runner::new(&codec, &conversion)
        .threads(threads)
        .events(tx)
        .run_source(source, &options, sink.as_mut(), &mut log);
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if cli.show_log {
                print!("{}", log.read_back()?);
            }
            return Err(e.into());
        }
    };

    if let Some(dir) = out_dir {
        match sink.finalize()? {
            Some(package) => {
                let path = package.write_to(&dir, ARCHIVE_NAME)?;
                if !cli.json {
                    println!("Wrote {}", path.display());
                }
            }
            None if !cli.json => println!("Nothing to write"),
            None => {}
        }
    }

    report(&cli, &summary, &log)?;
    Ok(())
}

/// Stock defaults, then the settings file, then command-line flags.
fn load_settings(cli: &Cli) -> Result<Settings, config::ConfigError> {
    let base = config::load_raw_settings(&cli.config)?;
    let merged = match base {
        Some(file) => config::merge_toml(file, cli_overlay(cli)),
        None => cli_overlay(cli),
    };
    config::resolve_settings(Some(merged))
}

/// Command-line flags as a TOML overlay, containing only the flags given.
fn cli_overlay(cli: &Cli) -> toml::Value {
    use toml::{Table, Value};

    let mut target = Table::new();
    if let Some(kb) = cli.target_kb {
        target.insert("size_kb".into(), Value::Integer(kb as i64));
    }
    if let Some(kb) = cli.tolerance_kb {
        target.insert("tolerance_kb".into(), Value::Integer(kb as i64));
    }
    if let Some(n) = cli.max_iterations {
        target.insert("max_iterations".into(), Value::Integer(n.into()));
    }
    if let Some(mode) = &cli.quality_mode {
        target.insert("quality_mode".into(), Value::String(mode.clone()));
    }

    let mut input = Table::new();
    if cli.no_recursive {
        input.insert("recursive".into(), Value::Boolean(false));
    }
    if cli.include_hidden {
        input.insert("ignore_hidden".into(), Value::Boolean(false));
    }

    let mut output = Table::new();
    if cli.keep_original_name {
        output.insert("keep_original_name".into(), Value::Boolean(true));
    }
    if let Command::Convert {
        subfolder: Some(name),
        ..
    } = &cli.command
    {
        output.insert("subfolder".into(), Value::String(name.clone()));
    }

    let mut log = Table::new();
    if let Some(path) = &cli.log_file {
        log.insert(
            "file".into(),
            Value::String(path.to_string_lossy().into_owned()),
        );
    }

    let mut processing = Table::new();
    if let Some(jobs) = cli.jobs {
        processing.insert("max_processes".into(), Value::Integer(jobs as i64));
    }

    let mut root = Table::new();
    for (key, table) in [
        ("target", target),
        ("input", input),
        ("output", output),
        ("log", log),
        ("processing", processing),
    ] {
        if !table.is_empty() {
            root.insert(key.into(), Value::Table(table));
        }
    }
    Value::Table(root)
}

fn report(cli: &Cli, summary: &RunSummary, log: &RunLog) -> Result<(), Box<dyn std::error::Error>> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        output::print_summary(summary);
    }
    if cli.show_log {
        print!("{}", log.read_back()?);
    }
    Ok(())
}
