pub mod agent;
pub mod browser;
pub mod config;
pub mod console;
pub mod error;
pub mod state;
pub mod tools;
pub mod workflow;

use crate::agent::{AgentGraph, LLMProvider};
use crate::browser::{BrowserDriver, CdpClient};
use crate::config::AppConfig;
use crate::console::EventPrinter;
use crate::error::{DuetError, Result};
use crate::workflow::{RunOutput, Workflow};
use futures::StreamExt;
use std::io::{self, Write};
use std::sync::Arc;

/// Interactive entry point: load config, ask for an instruction, launch
/// Chrome and let the agents work on it.
pub async fn run() -> Result<()> {
    let config = config::load_config()?;
    config::validate_config(&config)?;

    // A missing API key is reported before the user is prompted or Chrome starts
    let llm = agent::create_provider(&config.ai)?;
    tracing::info!(provider = llm.name(), model = llm.model(), "LLM client ready");

    let instruction = prompt_instruction()?;

    config::validate_chrome_path(&config.chrome_path)?;
    tracing::info!("Launching browser...");
    let browser = Arc::new(CdpClient::launch(&config.chrome_path, &config.browser).await?);
    tracing::info!(cdp_port = browser.cdp_port(), "Browser launched");

    let result = run_instruction(&config, llm, browser.clone(), &instruction, io::stdout()).await;

    // Always close browser, regardless of success or failure
    tracing::info!("Closing browser...");
    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser cleanly: {}", e);
    }

    let output = result?;
    tracing::info!(
        steps = output.steps,
        screenshots = output.state.screenshots.len(),
        final_agent = %output.final_agent,
        "Run finished"
    );
    Ok(())
}

/// Run one instruction through the BrowserAgent/AnalysisAgent pair, printing
/// progress to `out` as events arrive.
pub async fn run_instruction<W: Write>(
    config: &AppConfig,
    llm: Arc<dyn LLMProvider>,
    browser: Arc<dyn BrowserDriver>,
    instruction: &str,
    out: W,
) -> Result<RunOutput> {
    let graph = AgentGraph::browsing_pair()?;
    let workflow = Workflow::new(graph, llm, browser).with_max_steps(config.workflow.max_steps);

    let mut handler = workflow.run(instruction);
    let mut printer = EventPrinter::new(out);
    let mut printed = Ok(());
    {
        let mut events = handler.stream_events();
        while let Some(event) = events.next().await {
            if let Err(e) = printer.handle(&event) {
                printed = Err(e);
                break;
            }
        }
    }

    // The runner must release the browser before this returns
    let output = handler.finish().await;
    printed?;
    output
}

fn prompt_instruction() -> Result<String> {
    print!("Enter your browsing instruction: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let instruction = line.trim();
    if instruction.is_empty() {
        return Err(DuetError::Validation(
            "No browsing instruction given".to_string(),
        ));
    }
    Ok(instruction.to_string())
}
