use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use colored::*;
use engine::book::{Book, BookBuilder};
use engine::transpositions::TTable;

/// Build, merge or inspect an on-disk opening book.
#[derive(Debug, Subcommand)]
pub enum BookCommand {
    /// Grow a book file by repeatedly expanding its cheapest leaf.
    Build {
        /// Path to the book file. Created fresh if it doesn't exist yet.
        #[arg(short, long)]
        path: PathBuf,

        /// How long to spend extending the book, in seconds.
        #[arg(short, long, default_value = "60")]
        seconds: u64,

        /// How many threads each extension search gets.
        #[arg(short, long, default_value = "1")]
        threads: usize,

        /// Size, in MiB, of the transposition table used while extending.
        #[arg(long, default_value = "64")]
        hash: usize,
    },

    /// Merge one book file into another, keeping the deeper/better result
    /// on hash collisions.
    Merge {
        /// The book that receives the merged nodes.
        #[arg(short, long)]
        into: PathBuf,

        /// The book to merge in. Left untouched.
        #[arg(short, long)]
        from: PathBuf,
    },

    /// Print summary statistics about a book file.
    Info {
        #[arg(short, long)]
        path: PathBuf,
    },
}

impl BookCommand {
    pub fn run(self) -> anyhow::Result<()> {
        match self {
            BookCommand::Build { path, seconds, threads, hash } => {
                build(path, seconds, threads, hash)
            }
            BookCommand::Merge { into, from } => merge(into, from),
            BookCommand::Info { path } => info(path),
        }
    }
}

fn build(path: PathBuf, seconds: u64, threads: usize, hash: usize) -> anyhow::Result<()> {
    let book = if path.exists() {
        Book::load(&path).with_context(|| format!("loading book at {}", path.display()))?
    } else {
        Book::new()
    };

    let tt = TTable::with_capacity(hash);
    let mut builder = BookBuilder::new(&book, &tt, Duration::from_secs(seconds), threads);

    println!(
        "{} book with {} node(s), extending for {}s on {} thread(s)...",
        "Building".green(),
        book.len(),
        seconds,
        threads
    );

    builder.run(None);

    book.save(&path)
        .with_context(|| format!("saving book to {}", path.display()))?;

    println!("{} {} node(s) to {}", "Saved".green(), book.len(), path.display());

    Ok(())
}

fn merge(into: PathBuf, from: PathBuf) -> anyhow::Result<()> {
    let target = Book::load(&into).with_context(|| format!("loading {}", into.display()))?;
    let source = Book::load(&from).with_context(|| format!("loading {}", from.display()))?;

    let before = target.len();
    target.merge(&source);

    target
        .save(&into)
        .with_context(|| format!("saving merged book to {}", into.display()))?;

    println!(
        "{} {} node(s) from {} into {} ({} -> {})",
        "Merged".green(),
        source.len(),
        from.display(),
        into.display(),
        before,
        target.len()
    );

    Ok(())
}

fn info(path: PathBuf) -> anyhow::Result<()> {
    let book = Book::load(&path).with_context(|| format!("loading {}", path.display()))?;

    println!("{}: {}", "Book".bright_blue(), path.display());
    println!("{}: {}", "Nodes".bright_blue(), book.len());

    if let Some(best) = book.best_move(book.root().borrow().hash_key) {
        println!("{}: {best}", "Root best move".bright_blue());
    } else {
        println!("{}: none searched yet", "Root best move".bright_blue());
    }

    Ok(())
}
