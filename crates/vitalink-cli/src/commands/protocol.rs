use chrono::{Utc, Weekday};
use clap::Subcommand;
use vitalink_core::{kickoff_cadence, schedule_protocol_messages, ProtocolAssignment, Store};

#[derive(Subcommand)]
pub enum ProtocolAction {
    /// Assign a protocol to a patient
    Assign {
        /// Phone number
        phone: String,
        /// Protocol catalog id
        protocol_id: String,
        /// Weigh-day: mon..sun
        #[arg(long, default_value = "fri")]
        weigh_day: String,
        /// Target weight in kg
        #[arg(long)]
        target: Option<f64>,
    },
    /// Show a patient's active assignment
    Show {
        /// Phone number
        phone: String,
    },
}

fn parse_weekday(s: &str) -> Result<Weekday, Box<dyn std::error::Error>> {
    match s {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        other => Err(format!("unknown weekday: {other}").into()),
    }
}

pub fn run(action: ProtocolAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;

    match action {
        ProtocolAction::Assign {
            phone,
            protocol_id,
            weigh_day,
            target,
        } => {
            let weigh_day = parse_weekday(&weigh_day)?;
            let patient = super::patient_by_phone(&store, &phone)?;
            let assignment = ProtocolAssignment::new(patient.id, &protocol_id, weigh_day, target);
            store.insert_assignment(&assignment)?;
            let cadence = kickoff_cadence(&protocol_id);
            for message in
                schedule_protocol_messages(&assignment, &patient.phone, Utc::now(), &cadence)
            {
                store.insert_scheduled(&message)?;
            }
            println!(
                "Assignment created: {} ({} messages queued)",
                assignment.id,
                cadence.len()
            );
        }
        ProtocolAction::Show { phone } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            match store.active_protocol_assignment(patient.id)? {
                Some(assignment) => println!("{}", serde_json::to_string_pretty(&assignment)?),
                None => println!("no active assignment"),
            }
        }
    }
    Ok(())
}
