use chrono::Utc;
use clap::Subcommand;
use vitalink_core::{Config, Patient, PatientStatus, PlanTier, Store, SummaryService};

#[derive(Subcommand)]
pub enum PatientAction {
    /// Register a new patient
    Add {
        /// Phone number in E.164 form
        phone: String,
        /// Display name
        name: String,
        /// Plan tier: freemium, premium, or vip
        #[arg(long, default_value = "premium")]
        plan: String,
    },
    /// List all patients
    List,
    /// Activate a pending patient
    Activate {
        /// Phone number
        phone: String,
    },
    /// Gamification summary for a patient
    Summary {
        /// Phone number
        phone: String,
    },
    /// Badge progress for a patient
    Badges {
        /// Phone number
        phone: String,
    },
    /// Check-in history for a patient
    History {
        /// Phone number
        phone: String,
        #[arg(long, default_value_t = 30)]
        limit: u32,
    },
}

fn parse_plan(s: &str) -> Result<PlanTier, Box<dyn std::error::Error>> {
    match s {
        "freemium" => Ok(PlanTier::Freemium),
        "premium" => Ok(PlanTier::Premium),
        "vip" => Ok(PlanTier::Vip),
        other => Err(format!("unknown plan tier: {other}").into()),
    }
}

pub fn run(action: PatientAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;

    match action {
        PatientAction::Add { phone, name, plan } => {
            let plan = parse_plan(&plan)?;
            let config = Config::load_or_default();
            let patient = Patient::new(&phone, &name, plan, Utc::now().date_naive())
                .with_weekly_goal(config.gamification.weekly_goal);
            store.insert_patient(&patient)?;
            println!("Patient created: {}", patient.id);
        }
        PatientAction::List => {
            let patients = store.list_patients()?;
            println!("{}", serde_json::to_string_pretty(&patients)?);
        }
        PatientAction::Activate { phone } => {
            let mut patient = super::patient_by_phone(&store, &phone)?;
            patient.status = PatientStatus::Active;
            store.update_patient(&patient)?;
            println!("Patient activated: {}", patient.id);
        }
        PatientAction::Summary { phone } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            let summary = SummaryService::new(&store).gamification_summary(patient.id)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        PatientAction::Badges { phone } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            let progress = SummaryService::new(&store).badge_progress(patient.id)?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
        PatientAction::History { phone, limit } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            let history = SummaryService::new(&store).checkin_history(patient.id, limit)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}
