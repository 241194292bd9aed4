use chrono::Utc;
use clap::Subcommand;
use vitalink_core::{Config, EngagementEngine, HttpNlpService, HttpOutboundSender, Store};

#[derive(Subcommand)]
pub enum InboundAction {
    /// Feed one inbound message through the engine
    Handle {
        /// Sender phone number
        phone: String,
        /// Message text
        text: String,
        /// External delivery id, for webhook dedupe
        #[arg(long)]
        external_id: Option<String>,
    },
}

pub fn run(action: InboundAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    let config = Config::load_or_default();

    // The HTTP clients block on the ambient tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let nlp = HttpNlpService::new(&config.services.nlp_base_url);
    let sender = HttpOutboundSender::new(&config.services.gateway_url);
    let engine = EngagementEngine::new(&store, &nlp, &sender);

    match action {
        InboundAction::Handle {
            phone,
            text,
            external_id,
        } => {
            let outcome = engine.handle_inbound(
                &phone,
                &text,
                external_id.as_deref(),
                Utc::now().date_naive(),
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }
    Ok(())
}
