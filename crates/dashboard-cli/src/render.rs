use dashboard_core::tracker::NodeStatus;
use dashboard_core::{LogLevel, PipelineNode, Session, SessionUpdate};

pub fn print_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::Event { .. } => {}
        SessionUpdate::Interrupted(kind) => println!("paused: {kind}"),
        SessionUpdate::Finished { state } => println!("stream ended ({state})"),
        SessionUpdate::Failed { message } => println!("stream failed: {message}"),
    }
}

pub fn print_progress(session: &Session) {
    let statuses = &session.progress().statuses;
    for node in PipelineNode::ALL {
        let marker = match statuses.status_of(node) {
            NodeStatus::Completed => "done",
            NodeStatus::Active => "....",
            NodeStatus::Failed => "FAIL",
            NodeStatus::Pending => "    ",
        };
        println!("  [{marker}] {node}");
    }
}

pub fn print_summary(session: &Session) {
    if let Some(thread_id) = session.thread_id() {
        println!("thread: {thread_id}");
    }
    println!("state:  {}", session.state());
    print_progress(session);
    if let Some(interrupt) = session.interrupt() {
        println!("pending {} pause", interrupt.kind);
        if let Some(node) = &interrupt.resume_from {
            println!("resumes from: {node}");
        }
        match serde_json::to_string_pretty(&interrupt.value) {
            Ok(value) => println!("{value}"),
            Err(_) => println!("{}", interrupt.value),
        }
    }
}

pub fn print_log(session: &Session) {
    for entry in session.log().entries() {
        let level = match entry.level {
            LogLevel::Info => "info",
            LogLevel::Success => "ok",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        };
        println!("{} {level:>5} {}", entry.at.format("%H:%M:%S"), entry.message);
    }
}
