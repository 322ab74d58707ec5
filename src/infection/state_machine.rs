//! Per-survivor infection state machine: `Clean -> Infected`, once

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::threshold_reached;
use crate::core::config::AfterInfection;
use crate::core::error::{EngineError, Result};
use crate::core::types::{InfectionState, SurvivorId};
use crate::store::{scoped_transaction, Store};

/// Result of the flag step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The survivor moved from `Clean` to `Infected`
    Flagged,
    /// The survivor was infected already; nothing changed
    AlreadyInfected,
}

/// What a successful contamination report did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub survivor_id: SurvivorId,
    /// Counter value after this report
    pub contamination_reports: u32,
    pub state: InfectionState,
    /// True only for the report that triggered the transition
    pub newly_infected: bool,
}

/// Owns the contamination counter and infected flag of every survivor
#[derive(Clone)]
pub struct InfectionStateMachine {
    store: Store,
    after_infection: AfterInfection,
    budget: Duration,
}

impl InfectionStateMachine {
    pub fn new(store: Store, after_infection: AfterInfection) -> Self {
        let budget = store.default_budget();
        Self {
            store,
            after_infection,
            budget,
        }
    }

    /// Copy of this machine whose operations must finish within `budget`
    pub fn with_deadline(&self, budget: Duration) -> Self {
        Self {
            budget,
            ..self.clone()
        }
    }

    pub fn after_infection(&self) -> AfterInfection {
        self.after_infection
    }

    /// Count one contamination report, flagging the survivor on reaching
    /// the threshold
    ///
    /// The increment is one conditional UPDATE, so concurrent reports never
    /// lose counts, and it commits together with the escalation. With the
    /// default `Reject` policy an infected survivor gets `AlreadyInfected`
    /// and the counter stays put.
    pub async fn submit_contamination_report(&self, id: SurvivorId) -> Result<ReportOutcome> {
        let policy = self.after_infection;
        self.store
            .run(self.budget, move |conn, deadline| {
                scoped_transaction(conn, deadline, |tx| report_and_escalate(tx, id, policy))
            })
            .await
    }

    /// Explicit "flag as infected" request
    ///
    /// Refuses survivors that are infected already, without touching the
    /// counter; otherwise behaves like a contamination report. The increment
    /// is conditional on the survivor still being clean regardless of the
    /// configured policy, so a survivor infected between the check and the
    /// increment is also refused.
    pub async fn submit_explicit_infection_flag(&self, id: SurvivorId) -> Result<ReportOutcome> {
        self.store
            .run(self.budget, move |conn, deadline| {
                scoped_transaction(conn, deadline, |tx| {
                    if read_infected(tx, id)? {
                        tracing::debug!("Flag request for survivor {} refused: already infected", id);
                        return Err(EngineError::AlreadyInfected(id));
                    }
                    report_and_escalate(tx, id, AfterInfection::Reject)
                })
            })
            .await
    }

    pub async fn check_infection_status(&self, id: SurvivorId) -> Result<bool> {
        self.store
            .run(self.budget, move |conn, _| read_infected(conn, id))
            .await
    }

    /// Set the infected flag; flagging an infected survivor is a no-op
    pub async fn flag_as_infected(&self, id: SurvivorId) -> Result<Transition> {
        self.store
            .run(self.budget, move |conn, deadline| {
                scoped_transaction(conn, deadline, |tx| mark_infected(tx, id))
            })
            .await
    }

    /// Whether the survivor's report count has reached the threshold
    pub async fn evaluate_threshold(&self, id: SurvivorId) -> Result<bool> {
        self.store
            .run(self.budget, move |conn, _| {
                read_reports(conn, id).map(threshold_reached)
            })
            .await
    }
}

fn report_and_escalate(
    conn: &Connection,
    id: SurvivorId,
    policy: AfterInfection,
) -> Result<ReportOutcome> {
    let (reports, was_infected) = increment_reports(conn, id, policy)?;
    tracing::debug!("Survivor {} now has {} contamination reports", id, reports);

    let mut newly_infected = false;
    if threshold_reached(reports) {
        newly_infected = mark_infected(conn, id)? == Transition::Flagged;
        if newly_infected {
            tracing::info!(
                "Survivor {} flagged as infected after {} contamination reports",
                id,
                reports
            );
        }
    }

    Ok(ReportOutcome {
        survivor_id: id,
        contamination_reports: reports,
        state: InfectionState::from_flag(was_infected || threshold_reached(reports)),
        newly_infected,
    })
}

/// Atomically bump the counter; returns (new count, infected flag)
fn increment_reports(
    conn: &Connection,
    id: SurvivorId,
    policy: AfterInfection,
) -> Result<(u32, bool)> {
    let sql = match policy {
        AfterInfection::Reject => {
            "UPDATE survivors SET contamination_reports = contamination_reports + 1
             WHERE id = ?1 AND infected = 0
             RETURNING contamination_reports, infected"
        }
        AfterInfection::Accumulate => {
            "UPDATE survivors SET contamination_reports = contamination_reports + 1
             WHERE id = ?1
             RETURNING contamination_reports, infected"
        }
    };

    let updated = conn
        .query_row(sql, params![id.get()], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

    match updated {
        Some(row) => Ok(row),
        // No row matched: either the survivor is missing or the policy
        // excluded it for being infected.
        None if read_infected(conn, id)? => Err(EngineError::AlreadyInfected(id)),
        None => Err(EngineError::NotFound(id)),
    }
}

fn mark_infected(conn: &Connection, id: SurvivorId) -> Result<Transition> {
    let changed = conn.execute(
        "UPDATE survivors SET infected = 1 WHERE id = ?1 AND infected = 0",
        params![id.get()],
    )?;
    if changed == 1 {
        return Ok(Transition::Flagged);
    }
    // Surfaces NotFound for unknown survivors
    read_infected(conn, id)?;
    Ok(Transition::AlreadyInfected)
}

fn read_infected(conn: &Connection, id: SurvivorId) -> Result<bool> {
    conn.query_row(
        "SELECT infected FROM survivors WHERE id = ?1",
        params![id.get()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(EngineError::NotFound(id))
}

fn read_reports(conn: &Connection, id: SurvivorId) -> Result<u32> {
    conn.query_row(
        "SELECT contamination_reports FROM survivors WHERE id = ?1",
        params![id.get()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(EngineError::NotFound(id))
}
