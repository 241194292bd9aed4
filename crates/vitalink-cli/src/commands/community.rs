use chrono::Utc;
use clap::Subcommand;
use vitalink_core::{
    CommunityKind, Config, EngagementEngine, HttpNlpService, HttpOutboundSender, Store,
};

#[derive(Subcommand)]
pub enum CommunityAction {
    /// Record a community interaction and credit discipline
    Record {
        /// Phone number
        phone: String,
        /// Interaction kind: comment or reaction
        kind: String,
    },
}

fn parse_kind(s: &str) -> Result<CommunityKind, Box<dyn std::error::Error>> {
    match s {
        "comment" => Ok(CommunityKind::Comment),
        "reaction" => Ok(CommunityKind::Reaction),
        other => Err(format!("unknown community kind: {other}").into()),
    }
}

pub fn run(action: CommunityAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    let config = Config::load_or_default();

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let nlp = HttpNlpService::new(&config.services.nlp_base_url);
    let sender = HttpOutboundSender::new(&config.services.gateway_url);
    let engine = EngagementEngine::new(&store, &nlp, &sender);

    match action {
        CommunityAction::Record { phone, kind } => {
            let kind = parse_kind(&kind)?;
            let patient = super::patient_by_phone(&store, &phone)?;
            let result =
                engine.record_community_activity(patient.id, kind, Utc::now().date_naive())?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}
