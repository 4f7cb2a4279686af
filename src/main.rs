//! Command-line interface for xsdsynth

#[cfg(feature = "cli")]
use clap::{ArgAction, Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};

#[cfg(feature = "cli")]
use rand::SeedableRng;
#[cfg(feature = "cli")]
use rand_xorshift::XorShiftRng;
#[cfg(feature = "cli")]
use tracing::{info, Level};

#[cfg(feature = "cli")]
use xsdsynth::{
    load_schema_with_limits, serialize, GenerationOptions, Generator, Limits, SchemaGraph,
    Symbol,
};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsdsynth")]
#[command(author, version, about = "Generate XML instances from an XSD or RELAX NG schema", long_about = None)]
struct Cli {
    /// Increase log output on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate instance documents
    Generate {
        /// Path to the XSD or RELAX NG (XML syntax) schema file
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// Root element name; discovered from the schema if omitted
        #[arg(short, long)]
        root: Option<String>,

        /// Seed for the random generator; random if omitted
        #[arg(short, long)]
        seed: Option<u64>,

        /// Number of documents to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// JSON file with generation options
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Extra occurrences drawn for unbounded particles
        #[arg(long)]
        max_repeat: Option<u32>,

        /// Times a recursive symbol may nest before generation turns minimal
        #[arg(long)]
        recursion_ceiling: Option<u32>,

        /// Probability of emitting an optional attribute
        #[arg(long)]
        attribute_probability: Option<f64>,

        /// Attempts per pattern-constrained value
        #[arg(long)]
        pattern_retries: Option<u32>,

        /// Use strict input limits
        #[arg(long)]
        strict: bool,

        /// Output file, or directory when generating several documents
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect a schema: global declarations, recursion and root candidate
    Inspect {
        /// Path to the XSD or RELAX NG (XML syntax) schema file
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Generate {
            schema,
            root,
            seed,
            count,
            config,
            max_repeat,
            recursion_ceiling,
            attribute_probability,
            pattern_retries,
            strict,
            output,
        } => {
            let overrides = Overrides {
                max_repeat,
                recursion_ceiling,
                attribute_probability,
                pattern_retries,
            };
            cmd_generate(schema, root, seed, count, config, overrides, strict, output)
        }
        Commands::Inspect { schema, json } => cmd_inspect(schema, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Default)]
struct Overrides {
    max_repeat: Option<u32>,
    recursion_ceiling: Option<u32>,
    attribute_probability: Option<f64>,
    pattern_retries: Option<u32>,
}

#[cfg(feature = "cli")]
fn load(path: &Path, limits: &Limits) -> Result<SchemaGraph, Box<dyn std::error::Error>> {
    let source = fs::read(path)?;
    let graph = load_schema_with_limits(&source, limits)?;
    Ok(graph)
}

#[cfg(feature = "cli")]
fn options(
    config: Option<PathBuf>,
    overrides: Overrides,
) -> Result<GenerationOptions, Box<dyn std::error::Error>> {
    let mut options = match config {
        Some(path) => GenerationOptions::from_json(&fs::read_to_string(path)?)?,
        None => GenerationOptions::default(),
    };
    if let Some(v) = overrides.max_repeat {
        options = options.with_max_repeat(v);
    }
    if let Some(v) = overrides.recursion_ceiling {
        options = options.with_recursion_ceiling(v);
    }
    if let Some(v) = overrides.attribute_probability {
        options = options.with_attribute_inclusion_probability(v);
    }
    if let Some(v) = overrides.pattern_retries {
        options = options.with_pattern_retries(v);
    }
    options.validate()?;
    Ok(options)
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_generate(
    schema_path: PathBuf,
    root: Option<String>,
    seed: Option<u64>,
    count: usize,
    config: Option<PathBuf>,
    overrides: Overrides,
    strict: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let limits = if strict { Limits::strict() } else { Limits::default() };
    let graph = load(&schema_path, &limits)?;
    let options = options(config, overrides)?;

    let root_id = match &root {
        Some(name) => graph
            .element_by_name(name)
            .ok_or_else(|| format!("Element '{}' not found in schema", name))?,
        None => graph.root_element()?,
    };
    let root_name = graph
        .symbol_name(Symbol::Element(root_id))
        .map(|q| q.local_name.clone())
        .unwrap_or_default();

    let seed = seed.unwrap_or_else(rand::random);
    info!(seed, count, root = %root_name, "generating");

    let generator = Generator::new(&graph, options)?;
    let mut documents = Vec::with_capacity(count);
    for i in 0..count {
        let mut rng = XorShiftRng::seed_from_u64(seed.wrapping_add(i as u64));
        documents.push(serialize(&generator.generate(root_id, &mut rng)?)?);
    }

    match output {
        Some(path) if count > 1 => {
            fs::create_dir_all(&path)?;
            for (i, document) in documents.iter().enumerate() {
                fs::write(path.join(format!("{}-{}.xml", root_name, i + 1)), document)?;
            }
        }
        Some(path) => {
            let document = documents.concat();
            fs::write(path, document)?;
        }
        None => {
            for document in &documents {
                print!("{}", document);
            }
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_inspect(schema_path: PathBuf, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let graph = load(&schema_path, &Limits::default())?;
    let recursion = graph.recursion();
    let root = graph
        .root_element()
        .map(|id| graph.describe(Symbol::Element(id)))
        .map_err(|e| e.to_string());

    if json_output {
        use serde_json::{json, Map, Value};

        let mut output = Map::new();
        output.insert("version".to_string(), json!(xsdsynth::VERSION));
        output.insert("targetNamespace".to_string(), json!(graph.target_namespace()));
        output.insert(
            "elementFormDefault".to_string(),
            json!(format!("{:?}", graph.element_form_default()).to_lowercase()),
        );
        let symbols: Vec<Value> = graph
            .symbols()
            .map(|symbol| {
                json!({
                    "kind": symbol.kind().to_string(),
                    "name": graph.symbol_name(symbol).map(|q| q.to_string()),
                    "recursion": recursion.class(symbol).to_string(),
                    "rank": recursion.rank(symbol),
                    "references": recursion
                        .edges(symbol)
                        .iter()
                        .map(|edge| json!({
                            "target": graph.describe(edge.target),
                            "mandatory": edge.mandatory,
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        output.insert("symbols".to_string(), Value::Array(symbols));
        match &root {
            Ok(root) => output.insert("root".to_string(), json!(root)),
            Err(e) => output.insert("rootError".to_string(), json!(e)),
        };
        println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);
        return Ok(());
    }

    println!("xsdsynth v{}", xsdsynth::VERSION);
    println!();
    println!("Schema Information:");
    println!(
        "  Target Namespace: {}",
        graph.target_namespace().unwrap_or("(none)")
    );
    println!("  Element Form Default: {:?}", graph.element_form_default());
    println!("  Global Symbols: {}", graph.symbol_count());
    println!();
    println!("=== Global Symbols ===");
    for symbol in graph.symbols() {
        let rank = recursion
            .rank(symbol)
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<40} {:<14} rank {}",
            graph.describe(symbol),
            recursion.class(symbol).to_string(),
            rank
        );
    }
    println!();
    match root {
        Ok(root) => println!("Root: {}", root),
        Err(e) => println!("Root: none ({})", e),
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
