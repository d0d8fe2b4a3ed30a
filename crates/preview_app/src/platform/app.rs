use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use preview_core::{FontCacheStats, FontRegistrationCache, LineIndex};
use preview_engine::{
    AnnotateError, Annotator, DirectoryContainer, EventLoop, LineNumberAnnotator, Operation,
    ParseCache, PreviewSession, ReplyHandle, ResourceSource, SourceError,
};
use preview_logging::{preview_error, preview_info, preview_warn};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::config::{load_config, AppConfig, ANNOTATE_COMMAND};
use super::fonts::TtfFontRegistrar;
use super::logging;

const USAGE: &str = "usage: preview_app [--config FILE] [--json] [--line N] [--resource NAME]... ROOT NAME\n       preview_app annotate < in.html > out.html";

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("{name} is not served by the preview")]
    NotServed { name: String },
    #[error("{name} was not ready after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Annotate,
    Render(RenderArgs),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RenderArgs {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub line: Option<u32>,
    pub resources: Vec<String>,
    pub root: PathBuf,
    pub name: String,
}

pub(crate) fn parse_args(args: &[String]) -> Result<Command, AppError> {
    if args.first().map(String::as_str) == Some(ANNOTATE_COMMAND) {
        return Ok(Command::Annotate);
    }

    let mut render = RenderArgs::default();
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--json" => render.json = true,
            "--config" => render.config = Some(PathBuf::from(value_of(arg, iter.next())?)),
            "--resource" => render.resources.push(value_of(arg, iter.next())?.to_string()),
            "--line" => {
                let value = value_of(arg, iter.next())?;
                let line = value
                    .parse()
                    .map_err(|_| AppError::Usage(format!("invalid line number {value:?}")))?;
                render.line = Some(line);
            }
            flag if flag.starts_with("--") => {
                return Err(AppError::Usage(format!("unknown option {flag}")));
            }
            _ => positional.push(arg.clone()),
        }
    }

    match <[String; 2]>::try_from(positional) {
        Ok([root, name]) => {
            render.root = PathBuf::from(root);
            render.name = name;
            Ok(Command::Render(render))
        }
        Err(_) => Err(AppError::Usage(USAGE.to_string())),
    }
}

fn value_of<'a>(flag: &str, value: Option<&'a String>) -> Result<&'a str, AppError> {
    value
        .map(String::as_str)
        .ok_or_else(|| AppError::Usage(format!("{flag} needs a value")))
}

pub fn run_app() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match parse_args(&args) {
        Ok(Command::Annotate) => annotate_stdin(),
        Ok(Command::Render(render)) => run_render(&render),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::Usage(message)) => {
            eprintln!("{message}");
            ExitCode::from(2)
        }
        Err(err) => {
            preview_error!("{}", err);
            eprintln!("preview_app: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Subprocess mode: raw markup on stdin, annotated markup on stdout.
fn annotate_stdin() -> Result<(), AppError> {
    let mut raw = Vec::new();
    io::stdin().lock().read_to_end(&mut raw)?;
    let annotated = LineNumberAnnotator.annotate(&raw)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&annotated)?;
    stdout.flush()?;
    Ok(())
}

fn run_render(args: &RenderArgs) -> Result<(), AppError> {
    let config = load_config(args.config.as_deref());
    logging::initialize(&config.log);
    let settings = config.preview_settings();
    let container: Rc<DirectoryContainer> = Rc::new(DirectoryContainer::open(&args.root)?);
    preview_info!("Previewing {} from {:?}", args.name, container.root());
    let parse_cache = ParseCache::start(config.build_annotator(), &settings)?;
    let event_loop = EventLoop::new();
    let fonts = Rc::new(RefCell::new(FontRegistrationCache::new(Box::new(
        TtfFontRegistrar::default(),
    ))));
    let session = PreviewSession::new(
        container.clone(),
        parse_cache.clone(),
        fonts.clone(),
        event_loop.clone(),
        &settings,
    );

    let result = render(&session, container.as_ref(), &event_loop, &config, args).and_then(
        |rendered| {
            let stats = fonts.borrow().stats();
            write_output(rendered, stats, args.json)
        },
    );

    session.teardown();
    parse_cache.shutdown();
    parse_cache.join();
    result
}

struct Rendered {
    name: String,
    content_type: Option<String>,
    status: Option<u16>,
    body: Vec<u8>,
    scroll_to: Option<u32>,
    resources: Vec<ResourceReport>,
}

fn render(
    session: &PreviewSession,
    source: &dyn ResourceSource,
    event_loop: &EventLoop,
    config: &AppConfig,
    args: &RenderArgs,
) -> Result<Rendered, AppError> {
    let not_served = || AppError::NotServed {
        name: args.name.clone(),
    };
    let url = session.show(&args.name).ok_or_else(not_served)?;
    let reply = fetch(session, &url).ok_or_else(not_served)?;
    wait_for_reply(event_loop, &reply, config.render_timeout())?;

    let resources = args
        .resources
        .iter()
        .map(|name| fetch_resource(session, source, event_loop, config, name))
        .collect();

    let mut reply = reply.borrow_mut();
    Ok(Rendered {
        name: args.name.clone(),
        content_type: reply.content_type().map(str::to_string),
        status: reply.status().map(|status| status.code),
        body: reply.read_all(),
        scroll_to: args.line.and_then(|line| session.go_to_line(line)),
        resources,
    })
}

fn fetch(session: &PreviewSession, url: &Url) -> Option<ReplyHandle> {
    session
        .router()
        .create_request(Operation::Get, url)
        .into_reply()
}

fn wait_for_reply(
    event_loop: &EventLoop,
    reply: &ReplyHandle,
    timeout: Duration,
) -> Result<(), AppError> {
    if event_loop.run_until(timeout, || reply.borrow().is_finished()) {
        return Ok(());
    }
    let mut reply = reply.borrow_mut();
    reply.abort();
    Err(AppError::Timeout {
        name: reply.resource_name().to_string(),
        timeout,
    })
}

fn fetch_resource(
    session: &PreviewSession,
    source: &dyn ResourceSource,
    event_loop: &EventLoop,
    config: &AppConfig,
    name: &str,
) -> ResourceReport {
    let mut report = ResourceReport {
        name: name.to_string(),
        ..ResourceReport::default()
    };
    let Ok(url) = Url::from_file_path(source.name_to_path(name)) else {
        preview_warn!("No file URL for resource {}", name);
        return report;
    };
    let Some(reply) = fetch(session, &url) else {
        return report;
    };
    if let Err(err) = wait_for_reply(event_loop, &reply, config.render_timeout()) {
        preview_warn!("{}", err);
        return report;
    }
    let mut reply = reply.borrow_mut();
    report.served = true;
    report.content_type = reply.content_type().map(str::to_string);
    report.bytes = reply.read_all().len();
    report
}

#[derive(Debug, Default, Serialize)]
struct ResourceReport {
    name: String,
    served: bool,
    content_type: Option<String>,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct RenderReport {
    name: String,
    status: Option<u16>,
    content_type: Option<String>,
    bytes: usize,
    line_markers: Vec<u32>,
    scroll_to: Option<u32>,
    resources: Vec<ResourceReport>,
    font_lookups: u64,
    font_registrations: u64,
}

fn write_output(rendered: Rendered, fonts: FontCacheStats, json: bool) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    if json {
        let report = RenderReport {
            line_markers: LineIndex::from_annotated(&rendered.body).lines().to_vec(),
            bytes: rendered.body.len(),
            name: rendered.name,
            status: rendered.status,
            content_type: rendered.content_type,
            scroll_to: rendered.scroll_to,
            resources: rendered.resources,
            font_lookups: fonts.lookups,
            font_registrations: fonts.registrations,
        };
        serde_json::to_writer_pretty(&mut stdout, &report)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(&rendered.body)?;
    }
    stdout.flush()?;
    Ok(())
}
