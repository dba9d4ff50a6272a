//! Operator console: starts runs, follows their streams and answers pauses.

mod cli;
mod render;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use dashboard_core::observability::{ObservabilityConfig, init_observability};
use dashboard_core::prelude::*;
use dashboard_core::ReviewDecision;
use tracing::{Instrument as _, debug};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_observability(&ObservabilityConfig::from_env().verbosity(cli.verbose));

    let service: Arc<dyn OrchestrationService> = Arc::new(HttpService::from_env()?);
    let pipeline = Arc::new(PipelineConfig::default());

    match cli.command {
        Command::Run { query } => {
            let mut session = Session::new(service, pipeline);
            session.start_run(&query).await?;
            follow(&mut session).await?;
        }
        Command::Status(thread) => {
            let session = Session::attach(service, pipeline, thread.thread).await?;
            render::print_summary(&session);
            render::print_log(&session);
        }
        Command::Approve(thread) => {
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            decide(&mut session, Decision::approve()).await?;
        }
        Command::Edit {
            thread,
            instructions,
        } => {
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            decide(&mut session, Decision::edit(instructions)).await?;
        }
        Command::Reject {
            thread,
            feedback,
            outfit_ids,
        } => {
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            let decision = Decision::Review(ReviewDecision::Reject {
                rejection_feedback: feedback,
                selected_outfit_ids: outfit_ids,
            });
            decide(&mut session, decision).await?;
        }
        Command::Input {
            thread,
            urls,
            images,
            videos,
            query,
        } => {
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            let input = UserInput {
                custom_urls: urls,
                custom_images: images,
                custom_videos: videos,
                query,
            };
            decide(&mut session, Decision::UserInput(input)).await?;
        }
        Command::Respond { thread, data } => {
            let edited = data.read()?;
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            decide(&mut session, Decision::Edited(edited)).await?;
        }
        Command::Rerun { thread, node, data } => {
            let node: PipelineNode = node.parse()?;
            let edited = data.read()?;
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            session.request_rerun(node, edited).await?;
            follow(&mut session).await?;
        }
        Command::Stop(thread) => {
            let mut session = Session::attach(service, pipeline, thread.thread).await?;
            session.request_stop().await?;
            render::print_summary(&session);
        }
    }
    Ok(())
}

async fn decide(session: &mut Session, decision: Decision) -> Result<(), ClientError> {
    session.submit_decision(decision).await?;
    follow(session).await
}

/// Pumps the stream until it pauses, ends or fails. Ctrl-C cancels the
/// stream and stops the run on the service.
async fn follow(session: &mut Session) -> Result<(), ClientError> {
    let span = session.span();
    follow_inner(session).instrument(span).await
}

async fn follow_inner(session: &mut Session) -> Result<(), ClientError> {
    if let Some(thread_id) = session.thread_id() {
        println!("thread: {thread_id}");
    }
    let interrupted = Arc::new(AtomicBool::new(false));
    let watcher = session.abort_handle().map(|handle| {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                handle.abort();
            }
        })
    });

    let mut shown = session.progress().statuses.clone();
    while let Some(update) = session.next_update().await {
        let statuses = &session.progress().statuses;
        if *statuses != shown {
            render::print_progress(session);
            shown = statuses.clone();
        }
        render::print_update(&update);
    }
    if let Some(watcher) = watcher {
        watcher.abort();
    }

    if interrupted.load(Ordering::SeqCst) {
        debug!("ctrl-c received, stopping run");
        session.request_stop().await?;
    }
    if session.state() == WorkflowState::Error {
        render::print_log(session);
    } else {
        render::print_summary(session);
    }
    Ok(())
}
