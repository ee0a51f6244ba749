//! faceid - face gallery maintenance and feature search.
//!
//! Works on precomputed feature vectors (JSON arrays), so no detection or
//! extraction models are needed.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use giztoy_faceid::{
    AddOutcome, DeleteOutcome, FaceId, Gallery, PersonId, Record, SearchType, codec,
    cosine_similarity, matcher,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::{Config, read_feature};

/// Face gallery maintenance and feature search.
#[derive(Parser, Debug)]
#[command(name = "faceid")]
#[command(about = "Face gallery maintenance and feature search")]
struct Cli {
    /// YAML file with search defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty gallery file (replaces an existing one)
    Create {
        gallery: PathBuf,
    },
    /// List the enrolled faces
    List {
        gallery: PathBuf,
    },
    /// Enrol a feature vector
    Add {
        gallery: PathBuf,
        #[arg(long)]
        person: String,
        #[arg(long)]
        face: String,
        /// JSON array of numbers
        #[arg(long)]
        feature: PathBuf,
        /// Rewrite the whole file instead of appending
        #[arg(long)]
        full: bool,
    },
    /// Delete a face and rewrite the gallery
    Del {
        gallery: PathBuf,
        #[arg(long)]
        person: String,
        #[arg(long)]
        face: String,
    },
    /// Rank enrolled identities against a feature vector
    Search {
        gallery: PathBuf,
        /// JSON array of numbers
        #[arg(long)]
        feature: PathBuf,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// face_level, person_level_max or person_level_avg (or 0, 1, 2)
        #[arg(short = 's', long)]
        search_type: Option<SearchType>,
        /// Drop results scoring below this value
        #[arg(long)]
        min_score: Option<f32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .init();
    }

    let cfg = Config::load(cli.config.as_deref())?;
    debug!(?cfg, "config");

    match cli.command {
        Commands::Create { gallery } => {
            codec::create_empty(&gallery)?;
            println!("created {}", gallery.display());
        }
        Commands::List { gallery } => list(&gallery)?,
        Commands::Add {
            gallery,
            person,
            face,
            feature,
            full,
        } => add(&gallery, &person, &face, &feature, full)?,
        Commands::Del {
            gallery,
            person,
            face,
        } => del(&gallery, &person, &face)?,
        Commands::Search {
            gallery,
            feature,
            top_k,
            search_type,
            min_score,
        } => {
            let top_k = top_k.unwrap_or(cfg.top_k);
            let search_type = search_type.unwrap_or(cfg.search_type);
            let min_score = min_score.or(cfg.min_score);
            search(&gallery, &feature, top_k, search_type, min_score)?;
        }
    }
    Ok(())
}

fn open(path: &Path) -> Result<Gallery> {
    let records = codec::load_all(path)?;
    if let Some(first) = records.first() {
        let want = first.feature.dim();
        if let Some(r) = records.iter().find(|r| r.feature.dim() != want) {
            bail!(
                "{}: {}/{} has feature dimension {}, gallery uses {want}",
                path.display(),
                r.person_id,
                r.face_id,
                r.feature.dim()
            );
        }
    }
    let (gallery, skipped) = Gallery::from_saved(records);
    for r in &skipped {
        warn!(person = %r.person_id, face = %r.face_id, "skipping superseded gallery record");
    }
    Ok(gallery)
}

fn list(path: &Path) -> Result<()> {
    let gallery = open(path)?;
    let persons = gallery.persons();
    for person in &persons {
        for r in gallery.faces_of(person.as_str()) {
            println!("{}\t{}\t{}", person, r.face_id, r.feature.dim());
        }
    }
    println!("{} faces, {} persons", gallery.len(), persons.len());
    Ok(())
}

fn add(path: &Path, person: &str, face: &str, feature: &Path, full: bool) -> Result<()> {
    let mut gallery = open(path)?;
    let feature = read_feature(feature)?;
    if let Some(first) = gallery.records().first() {
        let want = first.feature.dim();
        if feature.len() != want {
            bail!("feature dimension {}, gallery uses {want}", feature.len());
        }
    }

    let record = Record::new(PersonId::new(person)?, FaceId::new(face)?, feature);
    if gallery.add(record) == AddOutcome::DuplicateKey {
        bail!("{person}/{face} is already enrolled");
    }

    if full {
        codec::rewrite_all(path, gallery.records())?;
    } else {
        codec::append_all(path, &gallery.pending())?;
    }
    println!("added {person}/{face}");
    Ok(())
}

fn del(path: &Path, person: &str, face: &str) -> Result<()> {
    let mut gallery = open(path)?;
    if gallery.delete(person, face) == DeleteOutcome::NotFound {
        bail!("{person}/{face} not found");
    }
    codec::rewrite_all(path, gallery.records())?;
    println!("deleted {person}/{face}");
    Ok(())
}

fn search(
    path: &Path,
    feature: &Path,
    top_k: usize,
    search_type: SearchType,
    min_score: Option<f32>,
) -> Result<()> {
    let gallery = open(path)?;
    let query = read_feature(feature)?;
    let mut results = matcher::search(
        &query,
        gallery.records(),
        search_type,
        top_k,
        cosine_similarity,
    )
    .with_context(|| format!("search {}", path.display()))?;
    if let Some(min) = min_score {
        results.retain(|r| r.score >= min);
    }

    let out: Vec<_> = results
        .iter()
        .map(|r| {
            json!({
                "person_id": r.person_id.as_str(),
                "face_id": r.face_id.as_str(),
                "score": r.score,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
