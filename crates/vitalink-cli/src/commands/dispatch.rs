use chrono::Utc;
use clap::Subcommand;
use vitalink_core::{Config, HttpOutboundSender, MessageDispatcher, Store};

#[derive(Subcommand)]
pub enum DispatchAction {
    /// Run one dispatch sweep over due scheduled messages
    Run,
    /// Queue missed-check-in reminders
    Remind,
}

pub fn run(action: DispatchAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    let config = Config::load_or_default();

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let sender = HttpOutboundSender::new(&config.services.gateway_url);
    let dispatcher = MessageDispatcher::new(&store, &sender)
        .with_limits(
            config.dispatch.batch_limit,
            config.dispatch.pending_max_age_days,
        )
        .with_seed_prefixes(config.dispatch.seed_prefixes.clone());

    match action {
        DispatchAction::Run => {
            let report = dispatcher.dispatch_due(Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        DispatchAction::Remind => {
            let now = Utc::now();
            let queued = dispatcher.queue_missed_checkin_reminders(now, now.date_naive())?;
            println!("reminders queued: {queued}");
        }
    }
    Ok(())
}
