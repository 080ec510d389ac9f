use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use beacon_tap::{normalize, Classifier, Hit, Platform, RawRequest, Verdict};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone, Debug)]
pub struct ClassifyArgs {
    /// Request URL
    #[arg(long)]
    pub url: String,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Request body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long, value_name = "FILE")]
    pub body_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct ClassifyOutput {
    platform: Option<Platform>,
    rejected: Option<String>,
    hits: Vec<Hit>,
}

pub fn cmd_classify(args: ClassifyArgs, ctx: &CliContext) -> Result<ExitCode> {
    let body = match &args.body_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read body from {}", path.display()))?,
        ),
        None => args.body.clone(),
    };
    let request = RawRequest::new(args.url.as_str(), args.method.to_ascii_uppercase(), body);
    let classifier = Classifier::new(&ctx.config().tap)?;

    let output = match classifier.verdict(&request) {
        Verdict::Accepted(platform) => ClassifyOutput {
            platform: Some(platform),
            rejected: None,
            hits: normalize(&request, platform),
        },
        Verdict::Rejected(platform, reason) => ClassifyOutput {
            platform: Some(platform),
            rejected: Some(reason.to_string()),
            hits: Vec::new(),
        },
        Verdict::Unmatched => ClassifyOutput {
            platform: None,
            rejected: None,
            hits: Vec::new(),
        },
    };

    if !print_structured(ctx.output(), &output)? {
        match (output.platform, &output.rejected) {
            (None, _) => println!("Not an analytics request"),
            (Some(platform), Some(reason)) => {
                println!("Endpoint matches {} but the request was rejected: {reason}", platform.display_name())
            }
            (Some(platform), None) => {
                println!("Platform: {}", platform.display_name());
                for hit in &output.hits {
                    println!("{}", hit.label());
                    for (key, value) in hit.fields() {
                        println!("  {key} = {value}");
                    }
                }
            }
        }
    }

    if output.platform.is_some() && output.rejected.is_none() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
