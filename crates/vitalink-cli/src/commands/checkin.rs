use chrono::Utc;
use clap::Subcommand;
use vitalink_core::{Config, EngagementEngine, HttpNlpService, HttpOutboundSender, Store};

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Start today's check-in for a patient
    Start {
        /// Phone number
        phone: String,
    },
    /// Show today's check-in state for a patient
    Status {
        /// Phone number
        phone: String,
    },
}

pub fn run(action: CheckinAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;

    match action {
        CheckinAction::Start { phone } => {
            let config = Config::load_or_default();
            let rt = tokio::runtime::Runtime::new()?;
            let _guard = rt.enter();

            let nlp = HttpNlpService::new(&config.services.nlp_base_url);
            let sender = HttpOutboundSender::new(&config.services.gateway_url);
            let engine = EngagementEngine::new(&store, &nlp, &sender);

            let patient = super::patient_by_phone(&store, &phone)?;
            let checkin = engine.start_checkin(patient.id, Utc::now().date_naive())?;
            println!("Check-in started at step: {}", checkin.step.as_str());
        }
        CheckinAction::Status { phone } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            match store.checkin_for_day(patient.id, Utc::now().date_naive())? {
                Some(checkin) => println!("{}", serde_json::to_string_pretty(&checkin)?),
                None => println!("no check-in today"),
            }
        }
    }
    Ok(())
}
