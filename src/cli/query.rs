use std::sync::Arc;
use std::time::{Duration, Instant};

use action_flow::QueryOrchestrator;
use anyhow::{Context, Result};
use cdp_adapter::CdpBrowser;
use clap::Args;
use dashprobe_core_types::{
    ExtractionResult, FailureKind, QueryFailure, QueryKind, QueryRequest, QueryStage, ReportWindow,
};
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::login::SsoLogin;
use crate::report::{exit_code, render, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct TicketArgs {
    /// Customer id to filter on (falls back to SMS_PID / query.pid)
    #[arg(long)]
    pub pid: Option<String>,

    /// Signature name to filter on (falls back to SMS_SIGN_NAME / query.sign_name)
    #[arg(long = "sign-name")]
    pub sign_name: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct RateArgs {
    /// Customer id to filter on (falls back to SMS_PID / query.pid)
    #[arg(long)]
    pub pid: Option<String>,

    /// Reporting window label, e.g. 30天 (falls back to query.window)
    #[arg(long)]
    pub window: Option<String>,
}

pub async fn cmd_ticket(args: TicketArgs, ctx: &CliContext, output: OutputFormat) -> Result<u8> {
    let defaults = &ctx.config().query;
    let Some(pid) = args.pid.or_else(|| defaults.pid.clone()) else {
        eprintln!("Customer id not provided; pass --pid or set SMS_PID");
        return Ok(1);
    };
    let Some(sign_name) = args.sign_name.or_else(|| defaults.sign_name.clone()) else {
        eprintln!("Signature name not provided; pass --sign-name or set SMS_SIGN_NAME");
        return Ok(1);
    };

    let request = QueryRequest::new(pid).with_sign_name(sign_name);
    run_query(QueryKind::Ticket, request, ctx, output).await
}

pub async fn cmd_rate(args: RateArgs, ctx: &CliContext, output: OutputFormat) -> Result<u8> {
    let defaults = &ctx.config().query;
    let Some(pid) = args.pid.or_else(|| defaults.pid.clone()) else {
        eprintln!("Customer id not provided; pass --pid or set SMS_PID");
        return Ok(1);
    };
    let window = args.window.unwrap_or_else(|| defaults.window.clone());

    let request = QueryRequest::new(pid).with_window(ReportWindow::new(window));
    run_query(QueryKind::SuccessRate, request, ctx, output).await
}

async fn run_query(kind: QueryKind, request: QueryRequest, ctx: &CliContext, output: OutputFormat) -> Result<u8> {
    let cfg = ctx.config();
    cfg.validate()?;

    let started = Instant::now();
    let browser = CdpBrowser::launch(cfg.cdp_config())
        .await
        .context("launching browser")?;
    let page = match browser.new_page().await {
        Ok(page) => page,
        Err(err) => {
            browser.shutdown().await;
            return Err(err).context("opening dashboard tab");
        }
    };

    let orchestrator = QueryOrchestrator::new(
        Arc::new(page),
        ctx.session_store(),
        Arc::new(SsoLogin::new(cfg.login.clone())),
        cfg.plans(),
    )
    .with_policy(cfg.timeouts.clone())
    .with_session_check(cfg.session_check());

    info!(%kind, customer = %request.customer_id, "running query");
    let result = match cfg.query.budget_ms {
        Some(budget_ms) => {
            let budget = Duration::from_millis(budget_ms);
            match tokio::time::timeout(budget, orchestrator.run(kind, &request)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(budget_ms, "query budget exhausted");
                    budget_exhausted(kind, &request, budget)
                }
            }
        }
        None => orchestrator.run(kind, &request).await,
    };
    browser.shutdown().await;

    println!("{}", render(&result, output)?);
    if output == OutputFormat::Human {
        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
        println!("elapsed {}", humantime::format_duration(elapsed));
    }
    Ok(exit_code(&result))
}

fn budget_exhausted(kind: QueryKind, request: &QueryRequest, budget: Duration) -> ExtractionResult {
    let failure = QueryFailure::new(
        FailureKind::Timeout,
        format!("query did not finish within {}", humantime::format_duration(budget)),
    )
    .at(QueryStage::NotStarted);
    let window = match kind {
        QueryKind::SuccessRate => request.window.clone(),
        QueryKind::Ticket => None,
    };
    ExtractionResult::failed(kind, failure).with_window(window)
}
