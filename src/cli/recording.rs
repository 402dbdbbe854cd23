use anyhow::{anyhow, Context, Result};

use super::args::{CombineCliArgs, FetchCliArgs, StatusCliArgs};
use crate::config::Config;
use crate::delivery::{DeliveryService, DeliveryStatus};
use crate::recording::{ledger, CombineDecision, MeetingRequest, RecordingPipeline};

pub async fn handle_fetch_command(args: FetchCliArgs) -> Result<()> {
    let mut config = Config::load()?;
    config.fetcher.show_progress = true;
    let pipeline = RecordingPipeline::from_config(&config)?;

    let request = MeetingRequest::new(args.url, args.name);
    let outcome = pipeline.process(&request).await?;
    let run_key = &outcome.run.run_key;

    if outcome.run.already_existed {
        println!("{} was already downloaded", run_key);
    }
    if let Some(output) = &outcome.output {
        println!("Video:   {}", output.video.display());
        println!("Archive: {}", output.archive.display());
    }

    let delivery = DeliveryService::from_config(&config.delivery);
    println!("Download link: {}", delivery.download_link(run_key));

    if let Some(email) = args.email.as_deref().filter(|email| !email.is_empty()) {
        let workdir = pipeline.workdir_for(run_key);
        match delivery
            .notify(&workdir, email, &request.requested_name)
            .await
            .context("Failed to send download notice")?
        {
            DeliveryStatus::Sent => println!("Notice sent to {}", email),
            DeliveryStatus::AlreadySent => println!("Notice was already sent"),
        }
    }

    Ok(())
}

pub async fn handle_combine_command(args: CombineCliArgs) -> Result<()> {
    let config = Config::load()?;
    let pipeline = RecordingPipeline::from_config(&config)?;

    if !pipeline.checked_workdir(&args.run_key)?.exists() {
        return Err(anyhow!(
            "Meeting {} is not downloaded. Download it first using the fetch command",
            args.run_key
        ));
    }

    let decision = if args.primary_only {
        CombineDecision::PrimaryOnly
    } else {
        CombineDecision::Merge
    };
    let output = pipeline.combine(&args.run_key, decision).await?;

    println!("Video:   {}", output.video.display());
    println!("Archive: {}", output.archive.display());
    Ok(())
}

pub fn handle_status_command(args: StatusCliArgs) -> Result<()> {
    let config = Config::load()?;
    let pipeline = RecordingPipeline::from_config(&config)?;
    let workdir = pipeline.checked_workdir(&args.run_key)?;

    if !workdir.exists() {
        println!("No run named {} in {:?}", args.run_key, pipeline.config().downloads_dir);
        return Ok(());
    }

    println!("Run:       {}", args.run_key);
    println!("Directory: {}", workdir.root().display());
    println!(
        "Complete:  {}",
        if ledger::is_complete(&workdir) { "yes" } else { "no" }
    );

    match pipeline.ledger_for(&args.run_key)? {
        Some(ledger) => {
            println!("Meeting:   {}", ledger.meeting_id);
            println!("Version:   {}", ledger.detected_platform_version);
            if let Some(start) = ledger.download_start_time {
                println!("Started:   {}", start.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(end) = ledger.download_end_time {
                println!("Finished:  {}", end.format("%Y-%m-%d %H:%M:%S"));
            }
            for (path, downloaded) in &ledger.downloaded_files {
                println!("  [{}] {}", if *downloaded { "x" } else { " " }, path);
            }
        }
        None => println!("No ledger written yet"),
    }

    Ok(())
}
