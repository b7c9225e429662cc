use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use adaptocr::persistence;
use adaptocr::{
    recognize_and_adapt, AdaptiveClassifier, AdaptiveWordRecognizer, EngineConfig, Page, ProgressMonitor,
    SpaceFixer, UnicharSet, WordListDictionary,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adaptocr")]
#[command(about = "Adaptive glyph classification and word-spacing repair", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize a segmented page, learning as it goes, then repair its spacing
    Run {
        /// Pre-trained template bundle
        #[arg(long)]
        templates: PathBuf,

        /// Word list, one word per line
        #[arg(long)]
        words: PathBuf,

        /// Engine config (JSON); defaults apply to anything missing
        #[arg(long)]
        config: Option<PathBuf>,

        /// Segmented page (JSON)
        page: PathBuf,
    },
    /// Summarize an adapted-templates file
    Inspect {
        /// Character set used to print class names
        #[arg(long)]
        unicharset: Option<PathBuf>,

        /// Adapted templates file
        adapted: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON output with full details
    Json,
    /// Plain text
    Text,
    /// Tab-separated, one record per line
    Tsv,
}

#[derive(Serialize)]
struct ClassSummary {
    class_id: usize,
    unichar: Option<String>,
    protos: usize,
    perm_protos: usize,
    configs: usize,
    perm_configs: usize,
    temp_protos: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            templates,
            words,
            config,
            page,
        } => run(templates, words, config, page, cli.format),
        Command::Inspect { unicharset, adapted } => inspect(unicharset, adapted, cli.format),
    }
}

fn run(
    templates: PathBuf,
    words: PathBuf,
    config: Option<PathBuf>,
    page: PathBuf,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let bundle = persistence::load_pretrained(&templates)?;
    info!(classes = bundle.templates.num_classes(), "loaded pre-trained templates");
    let dict = WordListDictionary::from_file(&words)?
        .with_numeric_punctuation(&config.fixspace.numeric_punctuation);
    let mut page: Page = serde_json::from_str(&fs::read_to_string(&page)?)?;

    let mut classifier = AdaptiveClassifier::with_default_extractor(
        config.classifier.clone(),
        config.matcher.clone(),
        Arc::new(bundle.unicharset),
        Arc::new(bundle.templates),
    )?;

    classifier.setup_pass1();
    for row in page.rows_mut() {
        let context = row.context;
        recognize_and_adapt(&mut classifier, &dict, &mut row.words, &context);
    }

    classifier.setup_pass2();
    let monitor = ProgressMonitor::new();
    {
        let mut recognizer = AdaptiveWordRecognizer::new(&mut classifier, &dict);
        SpaceFixer::new(&config.fixspace, &dict, &mut recognizer).fix_fuzzy_spaces(&mut page, Some(&monitor));
    }
    classifier.log_statistics();
    classifier.end_document()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
        OutputFormat::Text => {
            for row in page.rows() {
                println!("{}", row.text());
            }
        }
        OutputFormat::Tsv => {
            for (index, row) in page.rows().enumerate() {
                for word in row.words.iter().filter(|w| !w.part_of_combo) {
                    let b = word.word.bounding_box();
                    println!(
                        "{}\t{}\t{}\t{},{},{},{}",
                        index,
                        word.best_string(),
                        word.done,
                        b.left,
                        b.bottom,
                        b.right,
                        b.top
                    );
                }
            }
        }
    }
    Ok(())
}

fn inspect(
    unicharset: Option<PathBuf>,
    adapted: PathBuf,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let unicharset = unicharset.map(UnicharSet::from_file).transpose()?;
    let templates = persistence::load_adapted_templates(&adapted)?;

    let summaries: Vec<ClassSummary> = templates
        .classes
        .iter()
        .map(|(&class_id, class)| ClassSummary {
            class_id,
            unichar: unicharset
                .as_ref()
                .and_then(|set| set.unichar(class_id).ok())
                .map(str::to_string),
            protos: class.int_class.protos.len(),
            perm_protos: class.perm_protos.count(),
            configs: class.configs.len(),
            perm_configs: class.num_perm_configs(),
            temp_protos: class.temp_protos.len(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "num_perm_classes": templates.num_perm_classes,
                "num_non_empty_classes": templates.num_non_empty_classes,
                "classes": summaries,
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        OutputFormat::Text => {
            println!(
                "{} classes, {} permanent, {} protos, {} configs",
                templates.num_non_empty_classes,
                templates.num_perm_classes,
                templates.total_protos(),
                templates.total_configs()
            );
            for s in &summaries {
                println!(
                    "{:>5} {:<6} protos {}/{} configs {}/{} temp {}",
                    s.class_id,
                    s.unichar.as_deref().unwrap_or("?"),
                    s.perm_protos,
                    s.protos,
                    s.perm_configs,
                    s.configs,
                    s.temp_protos
                );
            }
        }
        OutputFormat::Tsv => {
            for s in &summaries {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    s.class_id,
                    s.unichar.as_deref().unwrap_or(""),
                    s.protos,
                    s.perm_protos,
                    s.configs,
                    s.perm_configs,
                    s.temp_protos
                );
            }
        }
    }
    Ok(())
}
