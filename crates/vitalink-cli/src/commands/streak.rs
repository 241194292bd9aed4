use clap::Subcommand;
use vitalink_core::{GamificationLedger, Store};

#[derive(Subcommand)]
pub enum StreakAction {
    /// Restore a patient's streak freezes (monthly maintenance)
    ResetFreezes {
        /// Phone number
        phone: String,
    },
    /// Restore streak freezes for every patient
    ResetAllFreezes,
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open()?;
    let ledger = GamificationLedger::new(&store);

    match action {
        StreakAction::ResetFreezes { phone } => {
            let patient = super::patient_by_phone(&store, &phone)?;
            ledger.reset_monthly_freezes(patient.id)?;
            println!("freezes restored for {}", patient.id);
        }
        StreakAction::ResetAllFreezes => {
            let patients = store.list_patients()?;
            let count = patients.len();
            for patient in patients {
                ledger.reset_monthly_freezes(patient.id)?;
            }
            println!("freezes restored for {count} patients");
        }
    }
    Ok(())
}
