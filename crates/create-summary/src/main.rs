use anyhow::{Context, Result};
use clap::Parser;
use shared::article::{load_article, GeneratedArticle};
use shared::thread::{build_thread, ThreadSummary};
use std::fs;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "create-summary")]
#[command(about = "Create a social-media thread summary from a generated article")]
struct Args {
    /// JSON file containing the generated article ('-' for stdin)
    article_file: String,

    /// Maximum number of tweets in the thread
    #[arg(long, default_value = "8")]
    max_tweets: usize,

    /// Output file path (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.format != "json" && args.format != "text" {
        anyhow::bail!("Invalid format: {}. Use 'json' or 'text'", args.format);
    }

    let article: GeneratedArticle = if args.article_file == "-" {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read article from stdin")?;
        serde_json::from_str(&input).context("Invalid article JSON on stdin")?
    } else {
        load_article(&PathBuf::from(&args.article_file))?
    };

    let thread = build_thread(&article, args.max_tweets);
    if thread.is_empty() {
        anyhow::bail!("Failed to create a thread from the article");
    }

    let output_content = if args.format == "json" {
        let summary = ThreadSummary::new(thread, &article);
        serde_json::to_string_pretty(&summary).context("Failed to serialize thread")?
    } else {
        // Text format for easy copy-paste
        let mut lines = Vec::new();
        for (i, tweet) in thread.iter().enumerate() {
            lines.push(format!("Tweet {}:", i + 1));
            lines.push(tweet.clone());
            lines.push(String::new());
        }
        lines.join("\n")
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output_content)
            .with_context(|| format!("Failed to write output to {}", output_path.display()))?;
        eprintln!("Thread saved to: {}", output_path.display());
    } else {
        println!("{}", output_content);
    }

    Ok(())
}
