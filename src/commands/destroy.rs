use crate::Context;
use crate::cli::DestroyArgs;
use crate::config::Config;
use crate::ui;
use anyhow::Result;
use converge_document::Document;

/// Destroy everything in state by converging on an empty document
pub fn run(ctx: &Context, config: &Config, args: &DestroyArgs) -> Result<()> {
    ui::warn("destroy removes every resource recorded in state");
    let document = Document::empty(&config.document_dir);
    super::apply::converge(
        ctx,
        config,
        &document,
        &super::apply::ConvergeArgs {
            auto_approve: args.auto_approve,
            dry_run: false,
            jobs: args.jobs,
            strict_drift: false,
            prompt: "Destroy all recorded resources?",
        },
    )
}
