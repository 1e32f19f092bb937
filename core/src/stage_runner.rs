use anyhow::Context;
use tokio::task::JoinHandle;

use crate::command::CommandSpec;
use crate::error::AggregateError;
use crate::logger::Logger;
use crate::stage_context::StageContext;

/// Runs pipeline stages chain by chain.
///
/// Stages piped into the next one are started and left running; the first
/// stage that is not piped onward ends the chain, and the whole chain is
/// joined before anything after it starts.
pub struct StageRunner {
    context: StageContext,
    logger: Logger,
}

impl StageRunner {
    pub fn new(context: StageContext, logger: Logger) -> Self {
        Self { context, logger }
    }

    pub async fn run(&self, specs: Vec<CommandSpec>) -> anyhow::Result<()> {
        let mut chain: Vec<JoinHandle<anyhow::Result<()>>> = Vec::new();

        for spec in specs {
            if chain.is_empty() {
                self.logger.info("Execute command:");
            }
            self.logger.info(&format!("  {}", spec));

            let piped_to_next = spec.is_piped_to_next();
            chain.push(tokio::spawn(spec.run(self.context.clone())));

            if !piped_to_next {
                join_chain(std::mem::take(&mut chain)).await?;
            }
        }

        if !chain.is_empty() {
            join_chain(chain).await?;
        }

        Ok(())
    }
}

/// Waits for every stage of a chain, even after one has failed, and reports
/// all failures.
async fn join_chain(chain: Vec<JoinHandle<anyhow::Result<()>>>) -> anyhow::Result<()> {
    let mut errors = Vec::new();
    for handle in chain {
        match handle.await.context("Pipeline stage panicked") {
            Ok(Ok(())) => {}
            Ok(Err(err)) | Err(err) => errors.push(err),
        }
    }

    AggregateError::collect(errors)
}
