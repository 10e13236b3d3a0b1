//! Language image management commands.

use anyhow::{Context, Result};
use bollard::image::ListImagesOptions;
use bollard::service::ImageSummary;
use bollard::Docker;
use clap::Subcommand;
use tracing::info;

use ojsandbox::config::Config;
use ojsandbox::language::Language;
use ojsandbox::sandbox::{ContainerRuntime, DockerRuntime};

/// Image management actions.
#[derive(Subcommand, Debug)]
pub enum ImageAction {
    /// Pull the configured language images
    Pull {
        /// Only pull the image for this language
        #[arg(long)]
        language: Option<Language>,

        /// Pull even if the image exists locally
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Show which language images are present locally
    Status,
}

/// What `pull` did for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Already present, skipped.
    Present,
    /// Pulled from the registry.
    Pulled,
}

/// Run image management command.
pub async fn run(action: ImageAction, config: &Config) -> Result<()> {
    match action {
        ImageAction::Pull { language, force } => {
            let runtime =
                DockerRuntime::connect().context("Failed to connect to Docker. Is Docker running?")?;
            runtime
                .ping()
                .await
                .context("Cannot ping Docker daemon. Is Docker running?")?;

            let languages = language.map_or_else(|| Language::ALL.to_vec(), |l| vec![l]);
            let images: Vec<(Language, String)> = languages
                .into_iter()
                .map(|l| (l, config.languages.image(l).to_string()))
                .collect();

            for (language, image, outcome) in pull_images(&runtime, &images, force).await? {
                match outcome {
                    PullOutcome::Present => {
                        println!("{language}: '{image}' already exists locally (use --force to pull anyway)");
                    }
                    PullOutcome::Pulled => println!("{language}: pulled '{image}'"),
                }
            }
        }
        ImageAction::Status => {
            show_image_status(config).await?;
        }
    }

    Ok(())
}

/// Pulls each image unless it is present locally and `force` is unset.
pub async fn pull_images(
    runtime: &dyn ContainerRuntime,
    images: &[(Language, String)],
    force: bool,
) -> Result<Vec<(Language, String, PullOutcome)>> {
    let mut outcomes = Vec::with_capacity(images.len());

    for (language, image) in images {
        if !force && runtime.image_exists(image).await? {
            info!(%language, image, "Image found locally, skipping pull");
            outcomes.push((*language, image.clone(), PullOutcome::Present));
            continue;
        }

        runtime
            .pull_image(image)
            .await
            .with_context(|| format!("Failed to pull image for {language}"))?;
        outcomes.push((*language, image.clone(), PullOutcome::Pulled));
    }

    Ok(outcomes)
}

/// Show local status of every configured language image.
async fn show_image_status(config: &Config) -> Result<()> {
    let docker = Docker::connect_with_local_defaults()
        .context("Failed to connect to Docker. Is Docker running?")?;

    docker
        .ping()
        .await
        .context("Cannot ping Docker daemon. Is Docker running?")?;

    let images = docker
        .list_images(Some(ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        }))
        .await
        .context("Failed to list images")?;

    let mut missing = false;
    for language in Language::ALL {
        let image = config.languages.image(language);
        let matching: Vec<&ImageSummary> = images
            .iter()
            .filter(|img| img.repo_tags.iter().any(|t| tag_matches(t, image)))
            .collect();

        println!("{language}: {image}");
        if matching.is_empty() {
            println!("  Status: Not found");
            missing = true;
            continue;
        }

        println!("  Status: Found");
        for img in matching {
            // Precision loss is fine for display
            #[allow(clippy::cast_precision_loss)]
            let size_megabytes = img.size.unsigned_abs() as f64 / 1_048_576.0;
            println!("  Size: {size_megabytes:.2} MB");
            println!("  ID: {}", img.id);
        }
    }

    if missing {
        println!("\nTo pull missing images, run:");
        println!("  ojsandbox image pull");
    }

    Ok(())
}

/// True if a repo tag such as `python:3.11-slim` names `image`.
fn tag_matches(repo_tag: &str, image: &str) -> bool {
    parse_image_tag(repo_tag) == parse_image_tag(image)
}

/// Parse image name and tag from a string.
fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rfind(':') {
        Some(colon_pos) if !image[colon_pos + 1..].contains('/') => {
            let (name, tag) = image.split_at(colon_pos);
            (name, &tag[1..])
        }
        _ => (image, "latest"),
    }
}
