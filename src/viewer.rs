//! Read-only terminal view over the stored leads and analytics.

use crate::store::{Lead, Store, StoreError, Visit};
use crate::utils::truncate;
use std::io::{self, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to write to terminal: {0}")]
    Io(#[from] io::Error),
}

/// Prints every lead, then the latest analytics visits.
pub async fn run(store: &dyn Store, out: &mut impl Write) -> Result<(), ViewerError> {
    let leads = store.recent_leads().await?;
    let visits = store.recent_visits().await?;

    render_leads(&leads, out)?;
    writeln!(out)?;
    render_visits(&visits, out)?;
    out.flush()?;
    Ok(())
}

pub fn render_leads(leads: &[Lead], out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Form Entries (Leads): {}", leads.len())?;
    writeln!(
        out,
        "{:<4} {:<15} {:<15} {:<20} {:<30} {:<20}",
        "ID", "Name", "Business", "Email", "Message", "Time"
    )?;
    for lead in leads {
        writeln!(
            out,
            "{:<4} {:<15} {:<15} {:<20} {:<30} {:<20}",
            lead.id,
            truncate(&lead.name, 15),
            truncate(&lead.business, 15),
            truncate(&lead.email, 20),
            truncate(&lead.message.replace('\n', " "), 28),
            truncate(&lead.created_at, 16),
        )?;
    }
    Ok(())
}

pub fn render_visits(visits: &[Visit], out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Analytics: {}", visits.len())?;
    writeln!(
        out,
        "{:<15} {:<15} {:<15} {:<6} {:<20}",
        "IP", "Loc", "Path", "Method", "Time"
    )?;
    for visit in visits {
        let location = format!("{}, {}", visit.city, visit.country);
        writeln!(
            out,
            "{:<15} {:<15} {:<15} {:<6} {:<20}",
            visit.ip,
            truncate(&location, 15),
            visit.path,
            visit.method,
            visit.created_at,
        )?;
    }
    Ok(())
}
