use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::client::{ClientOptions, DEFAULT_USER_AGENT};
use crate::config::{self, ConfigFile};
use crate::discovery::resolve;
use crate::model::{RunSummary, TestResult};
use crate::output::{self, OutputFormat};
use crate::prober::AcceptedStatus;
use crate::progress::Progress;
use crate::runner::{CancelToken, Options, Runner};
use crate::store::{JsonDirStore, SummaryStore, ANALYSIS_KIND};
use crate::utils::{format_bool, format_opt_value};

fn print_banner() {
    const BANNER: &str = r#"
                _ _                _ _   _
   __ _ _ __ (_) |__   ___  __ _| | |_| |__
  / _` | '_ \| | '_ \ / _ \/ _` | | __| '_ \
 | (_| | |_) | | | | |  __/ (_| | | |_| | | |
  \__,_| .__/|_|_| |_|\___|\__,_|_|\__|_| |_|
       |_|
       API endpoint discovery & health checks
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn arg_flags(arg: &clap::Arg) -> String {
    let mut parts: Vec<String> = arg.get_short().map(|c| format!("-{c}")).into_iter().collect();
    parts.extend(arg.get_long().map(|l| format!("--{l}")));
    parts.extend(
        arg.get_visible_aliases()
            .unwrap_or_default()
            .into_iter()
            .map(|a| format!("--{a}")),
    );
    let mut flags = parts.join(", ");
    if arg.get_action().takes_values() {
        let value_name = arg
            .get_value_names()
            .and_then(|names| names.first())
            .map(|name| name.as_str())
            .unwrap_or("VALUE");
        let optional = arg.get_num_args().map(|r| r.min_values() == 0).unwrap_or(false);
        if optional {
            flags.push_str(&format!(" [<{value_name}>]"));
        } else {
            flags.push_str(&format!(" <{value_name}>"));
        }
    }
    flags
}

// Groups flags by help heading, in declaration order.
fn render_custom_help() -> String {
    let cmd = CliArgs::command();
    let mut out = format!(
        "{} {}\n",
        cmd.get_name(),
        cmd.get_version().unwrap_or_default()
    );
    if let Some(long_about) = cmd.get_long_about().or_else(|| cmd.get_about()) {
        out.push_str(&format!("\n{long_about}\n"));
    }
    out.push_str(&format!("\nUsage: {} [OPTIONS]\n\n", cmd.get_name()));

    let mut sections: Vec<(&str, Vec<&clap::Arg>)> = Vec::new();
    for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
        let heading = arg.get_help_heading().unwrap_or("Options");
        match sections.iter_mut().find(|(h, _)| *h == heading) {
            Some((_, args)) => args.push(arg),
            None => sections.push((heading, vec![arg])),
        }
    }

    for (heading, args) in sections {
        out.push_str(&format!("{heading}:\n"));
        for arg in args {
            out.push_str(&format!("  {}\n", arg_flags(arg)));
            let help = arg.get_help().map(|h| h.to_string()).unwrap_or_default();
            if !help.trim().is_empty() {
                out.push_str(&format!("          {}\n", help.trim()));
            }
            out.push('\n');
        }
    }
    out
}

fn init_tracing(verbose: u8, no_color: bool) {
    use tracing_subscriber::EnvFilter;

    let crate_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("warn,apihealth={crate_level}"))
            .unwrap_or_else(|_| EnvFilter::new(crate_level))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .try_init();
}

#[derive(Clone, Debug)]
struct RunConfig {
    domain: String,
    endpoints: Vec<String>,
    concurrency: usize,
    rate: u32,
    timeout_ms: u64,
    workers: usize,
    output: Option<String>,
    output_format: Option<String>,
    export: bool,
    save_dir: Option<String>,
    proxy: String,
    header: String,
    user_agent: String,
    expect: Vec<u16>,
    follow_redirects: bool,
    insecure: bool,
    no_color: bool,
    discover_only: bool,
}

impl RunConfig {
    fn runner_options(&self) -> Options {
        let accepted = if self.expect.is_empty() {
            AcceptedStatus::success()
        } else {
            AcceptedStatus::success_or(self.expect.iter().copied())
        };
        Options {
            domain: self.domain.clone(),
            manual_endpoints: self.endpoints.clone(),
            concurrency: self.concurrency,
            rate: self.rate,
            timeout_ms: self.timeout_ms,
            accepted,
            client: ClientOptions {
                user_agent: self.user_agent.clone(),
                proxy: Some(self.proxy.clone()).filter(|p| !p.trim().is_empty()),
                header: Some(self.header.clone()).filter(|h| !h.trim().is_empty()),
                follow_redirects: self.follow_redirects,
                accept_invalid_certs: self.insecure,
                timeout: Duration::from_millis(self.timeout_ms),
            },
        }
    }
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };

    let domain = args
        .domain
        .or(cfg.domain)
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| "a domain is required (--domain or 'domain:' in config)".to_string())?;

    let endpoints: Vec<String> = if !args.endpoints.is_empty() {
        args.endpoints
            .iter()
            .flat_map(|raw| resolve::parse_manual_list(raw))
            .collect()
    } else {
        cfg.endpoints
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect()
    };

    let concurrency = args.concurrency.or(cfg.concurrency).unwrap_or(10);
    if concurrency == 0 {
        return Err("invalid concurrency, expected positive integer".to_string());
    }
    let rate = args.rate.or(cfg.rate).unwrap_or(0);
    let timeout_ms = args.timeout.or(cfg.timeout).unwrap_or(10_000);
    if timeout_ms == 0 {
        return Err("invalid timeout, expected positive number of milliseconds".to_string());
    }
    let workers = args.workers.or(cfg.workers).unwrap_or(4).max(1);

    let expect = match args.expect.or(cfg.expect) {
        Some(raw) if !raw.trim().is_empty() => crate::utils::parse_u16_set_csv(&raw)
            .map_err(|e| format!("invalid --expect '{raw}': {e}"))?
            .into_iter()
            .collect(),
        _ => Vec::new(),
    };

    let output = args
        .output
        .or(cfg.output)
        .map(|p| config::expand_tilde_string(&p));
    let output_format = args.output_format.or(cfg.output_format);
    if let Some(raw) = output_format.as_deref() {
        if OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid output format '{raw}', expected text or json"));
        }
    }
    let export = args.export || cfg.export.unwrap_or(false);
    let save_dir = args
        .save_dir
        .or(cfg.save_dir)
        .map(|p| config::expand_tilde_string(&p));

    let proxy = args.proxy.or(cfg.proxy).unwrap_or_default();
    let header = args.header.or(cfg.header).unwrap_or_default();
    let user_agent = args
        .user_agent
        .or(cfg.user_agent)
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    let follow_redirects = args
        .follow_redirects
        .or(cfg.follow_redirects)
        .unwrap_or(true);
    let insecure = args.insecure || cfg.insecure.unwrap_or(false);

    Ok(RunConfig {
        domain,
        endpoints,
        concurrency,
        rate,
        timeout_ms,
        workers,
        output,
        output_format,
        export,
        save_dir,
        proxy,
        header,
        user_agent,
        expect,
        follow_redirects,
        insecure,
        no_color,
        discover_only: args.discover_only,
    })
}

fn result_line(result: &TestResult) -> String {
    let status = result
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    let latency = result
        .latency
        .map(|l| format!("{}ms", l.round() as u64))
        .unwrap_or_else(|| "-".to_string());
    let mark = if result.pass {
        "PASS".bold().green()
    } else {
        "FAIL".bold().red()
    };
    let mut line = format!(
        "{}{}{} {}{}{} {} {}",
        "[".bold().white(),
        mark,
        "]".bold().white(),
        "[".bold().white(),
        status.bold().blue(),
        "]".bold().white(),
        result.endpoint.bold().cyan(),
        latency.yellow(),
    );
    if let Some(error) = result.error.as_deref() {
        line.push_str(&format!(" {}", error.red()));
    }
    line
}

fn build_progress_bar() -> Result<ProgressBar, String> {
    let pb = ProgressBar::new(0);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );
    Ok(pb)
}

async fn render_progress(pb: ProgressBar, mut rx: mpsc::UnboundedReceiver<Progress>) {
    while let Some(event) = rx.recv().await {
        match event {
            Progress::State(state) => pb.set_message(state.to_string()),
            Progress::Status(message) => {
                pb.println(format!("{} {}", "::".bold().white(), message))
            }
            Progress::Candidates { count } => pb.set_length(count as u64),
            Progress::ProbeFinished { result, .. } => {
                pb.inc(1);
                pb.println(result_line(&result));
            }
        }
    }
}

async fn write_file(path: &str, data: &[u8]) -> Result<(), String> {
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| format!("failed to open output file '{path}': {e}"))?;
    outfile
        .write_all(data)
        .await
        .map_err(|e| format!("failed to write output file '{path}': {e}"))?;
    Ok(())
}

async fn write_outputs(run: &RunConfig, summary: &RunSummary) -> Result<(), String> {
    if let Some(outfile_path) = run.output.as_ref() {
        let output_format = run
            .output_format
            .as_deref()
            .and_then(OutputFormat::parse)
            .or_else(|| output::infer_format_from_path(outfile_path))
            .unwrap_or(OutputFormat::Text);
        let rendered = match output_format {
            OutputFormat::Text => output::render_text(summary),
            OutputFormat::Json => output::render_json(summary),
        };
        write_file(outfile_path, &rendered).await?;
        format_kv_line("Output", outfile_path);
    }

    if run.export {
        let file_name =
            output::export_file_name(&summary.domain, summary.timestamp.timestamp_millis());
        write_file(&file_name, &output::render_json(summary)).await?;
        format_kv_line("Export", &file_name);
    }

    if let Some(dir) = run.save_dir.as_ref() {
        let store = JsonDirStore::new(dir);
        let summary = summary.clone();
        let saved = task::spawn_blocking(move || store.save(ANALYSIS_KIND, &summary))
            .await
            .map_err(|e| format!("failed to save run summary: {e}"))?
            .map_err(|e| e.to_string())?;
        format_kv_line("Saved", &saved.display().to_string());
    }
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    print_banner();

    let runner = Runner::new(run.runner_options()).map_err(|e| e.to_string())?;
    let target = runner.target();

    format_kv_line(
        "Target",
        &format!(
            "{} endpoints={}",
            target.base,
            if run.endpoints.is_empty() {
                "discover".to_string()
            } else {
                run.endpoints.len().to_string()
            }
        ),
    );
    format_kv_line(
        "HTTP",
        &format!(
            "rate={} conc={} workers={} timeout={}ms redirects={} insecure={} proxy={}",
            run.rate,
            run.concurrency,
            run.workers,
            run.timeout_ms,
            format_bool(run.follow_redirects),
            format_bool(run.insecure),
            if run.proxy.is_empty() { "off" } else { "on" },
        ),
    );
    let expect = run
        .expect
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format_kv_line(
        "Match",
        &format!("pass=2xx extra={}", format_opt_value(&expect, "none")),
    );
    println!();

    let pb = build_progress_bar()?;
    let (progress_tx, progress_rx) = mpsc::unbounded_channel::<Progress>();
    let render_handle = task::spawn(render_progress(pb.clone(), progress_rx));
    let now = Instant::now();

    let cancel = CancelToken::new();
    let ctrl_c_handle = task::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping run");
                cancel.cancel();
            }
        }
    });

    if run.discover_only {
        let found = runner.discover(&cancel, Some(progress_tx)).await;
        ctrl_c_handle.abort();
        let _ = render_handle.await;
        pb.finish_and_clear();
        println!();
        for candidate in &found.candidates {
            println!(
                "{}{}{} {}",
                "[".bold().white(),
                candidate.origin.as_str().bold().green(),
                "]".bold().white(),
                candidate.url.bold().cyan()
            );
        }
        println!();
        println!(
            ":: Completed :: discovered {} endpoint(s) in {}s ::",
            found.candidates.len(),
            now.elapsed().as_secs()
        );
        return Ok(());
    }

    let outcome = runner.run_with(&cancel, Some(progress_tx)).await;
    ctrl_c_handle.abort();
    let _ = render_handle.await;
    pb.finish_and_clear();
    let summary = outcome.map_err(|e| e.to_string())?;

    println!();
    print!("{}", output::render_share_text(&summary));
    if summary.cancelled {
        println!();
        println!(
            "{} {}/{} probes completed before the run was cancelled",
            "::".bold().yellow(),
            summary.results.len(),
            summary.candidates.len()
        );
    }
    println!();

    write_outputs(&run, &summary).await?;

    println!(
        ":: Completed :: run took {}s ::",
        now.elapsed().as_secs()
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", render_custom_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_tracing(args.verbose, args.no_color && !args.color);

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));

    if args.init_config {
        let path = user_config_path
            .or_else(config::default_config_path)
            .ok_or_else(|| "could not determine the home directory for the config".to_string())?;
        if config::ensure_default_config_file(&path)? {
            println!("wrote default config to {}", path.display());
        } else {
            println!("config already exists at {}", path.display());
        }
        return Ok(());
    }

    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;
    if run.no_color {
        colored::control::set_override(false);
    }

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(run.workers)
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
