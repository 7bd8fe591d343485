//! PostgreSQL store.
//!
//! The `postgres` client is blocking and carries its own small runtime, so
//! it must never be created, used or dropped on an async worker. `PgStore`
//! owns the client on a dedicated thread; each operation ships a closure to
//! that thread and awaits the reply on a oneshot channel. Statements run in
//! autocommit mode, one row per write.

use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres::{Client, NoTls, Row};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{Store, StoreResult};
use crate::model::{
    CacheEntry, Incident, IncidentKind, IncidentStatus, NewIncident, NewNotification, NewRefugeSite,
    NewResponder, Notification, RefugeSite, Region, Responder, RiskScore, StoreError,
};
use crate::regions::RegionSeed;

const BASE_SCHEMA: &str = include_str!("../../sql/001_base_schema.sql");

const REGION_COLUMNS: &str = "id, name, area, lat, lng, risk_score, last_updated";
const INCIDENT_COLUMNS: &str = "id, kind, severity, region_id, location, lat, lng, affected_people, \
                                description, source, status, reported_at, resolved_at";
const RESPONDER_COLUMNS: &str = "id, name, role, phone, region_id, status, current_incident_id";
const REFUGE_COLUMNS: &str = "id, name, region_id, lat, lng, capacity, kind";
const NOTIFICATION_COLUMNS: &str = "id, incident_id, message_en, message_sw, recipients_count, sent_at, status";

type Job = Box<dyn FnOnce(&mut Client) + Send + 'static>;

pub struct PgStore {
    jobs: mpsc::Sender<Job>,
}

impl PgStore {
    /// Connect, start the connection worker and apply the base schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let url = database_url.to_string();
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<StoreResult<()>>();

        thread::Builder::new()
            .name("hazmon-pg".into())
            .spawn(move || connection_worker(url, jobs_rx, ready_tx))
            .map_err(|e| StoreError::Unavailable(format!("failed to spawn connection worker: {}", e)))?;

        ready_rx
            .await
            .map_err(|_| StoreError::Unavailable("connection worker exited during connect".into()))??;

        let store = Self { jobs: jobs_tx };
        store
            .run(|client| client.batch_execute(BASE_SCHEMA).map_err(StoreError::from))
            .await?;
        info!("PostgreSQL store ready");
        Ok(store)
    }

    /// Run `f` against the client on the worker thread.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> StoreResult<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |client| {
            let _ = reply_tx.send(f(client));
        });
        self.jobs
            .send(job)
            .map_err(|_| StoreError::Unavailable("connection worker has exited".into()))?;
        reply_rx
            .await
            .map_err(|_| StoreError::Unavailable("connection worker dropped the request".into()))?
    }
}

fn connection_worker(url: String, jobs: mpsc::Receiver<Job>, ready: oneshot::Sender<StoreResult<()>>) {
    let mut client = match Client::connect(&url, NoTls) {
        Ok(client) => {
            let _ = ready.send(Ok(()));
            client
        }
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };

    // Exits when the last PgStore handle is dropped
    while let Ok(job) = jobs.recv() {
        if client.is_closed() {
            warn!("database connection closed, reconnecting");
            match Client::connect(&url, NoTls) {
                Ok(fresh) => client = fresh,
                Err(e) => warn!("reconnect failed: {}", e),
            }
        }
        job(&mut client);
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn region_from_row(row: &Row) -> StoreResult<Region> {
    let risk: i32 = row.try_get("risk_score")?;
    Ok(Region {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        area: row.try_get("area")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        risk_score: RiskScore::from_i64(risk as i64),
        last_updated: row.try_get("last_updated")?,
    })
}

fn incident_from_row(row: &Row) -> StoreResult<Incident> {
    let kind: String = row.try_get("kind")?;
    let severity: String = row.try_get("severity")?;
    let source: String = row.try_get("source")?;
    let status: String = row.try_get("status")?;
    let affected: i64 = row.try_get("affected_people")?;
    Ok(Incident {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        severity: severity.parse()?,
        region_id: row.try_get("region_id")?,
        location: row.try_get("location")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        affected_people: u64::try_from(affected)
            .map_err(|_| StoreError::Corrupt(format!("negative affected_people: {}", affected)))?,
        description: row.try_get("description")?,
        source: source.parse()?,
        status: status.parse()?,
        reported_at: row.try_get("reported_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn responder_from_row(row: &Row) -> StoreResult<Responder> {
    let status: String = row.try_get("status")?;
    Ok(Responder {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        phone: row.try_get("phone")?,
        region_id: row.try_get("region_id")?,
        status: status.parse()?,
        current_incident_id: row.try_get("current_incident_id")?,
    })
}

fn refuge_from_row(row: &Row) -> StoreResult<RefugeSite> {
    let capacity: i32 = row.try_get("capacity")?;
    Ok(RefugeSite {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        region_id: row.try_get("region_id")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        capacity: u32::try_from(capacity)
            .map_err(|_| StoreError::Corrupt(format!("negative refuge capacity: {}", capacity)))?,
        kind: row.try_get("kind")?,
    })
}

fn notification_from_row(row: &Row) -> StoreResult<Notification> {
    let status: String = row.try_get("status")?;
    let count: i32 = row.try_get("recipients_count")?;
    Ok(Notification {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        message_en: row.try_get("message_en")?,
        message_sw: row.try_get("message_sw")?,
        recipients_count: u32::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("negative recipients_count: {}", count)))?,
        sent_at: row.try_get("sent_at")?,
        status: status.parse()?,
    })
}

fn collect_rows<T>(rows: Vec<Row>, map: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

// ---------------------------------------------------------------------------
// Store implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for PgStore {
    async fn seed_regions(&self, seeds: &[RegionSeed]) -> StoreResult<usize> {
        let seeds = seeds.to_vec();
        self.run(move |client| {
            let mut inserted = 0;
            for seed in &seeds {
                inserted += client.execute(
                    "INSERT INTO regions (name, area, lat, lng) VALUES ($1, $2, $3, $4)
                     ON CONFLICT (name) DO NOTHING",
                    &[&seed.name, &seed.area, &seed.latitude, &seed.longitude],
                )?;
            }
            Ok(inserted as usize)
        })
        .await
    }

    async fn list_regions(&self) -> StoreResult<Vec<Region>> {
        self.run(|client| {
            let rows = client.query(
                &format!("SELECT {} FROM regions ORDER BY name", REGION_COLUMNS),
                &[],
            )?;
            collect_rows(rows, region_from_row)
        })
        .await
    }

    async fn update_region_risk(&self, region_id: i64, score: RiskScore, at: DateTime<Utc>) -> StoreResult<()> {
        let score = score.value() as i32;
        self.run(move |client| {
            let updated = client.execute(
                "UPDATE regions SET risk_score = $1, last_updated = $2 WHERE id = $3",
                &[&score, &at, &region_id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    entity: "region",
                    id: region_id,
                });
            }
            Ok(())
        })
        .await
    }

    async fn insert_incident(&self, incident: NewIncident) -> StoreResult<Incident> {
        self.run(move |client| {
            let affected = i64::try_from(incident.affected_people).unwrap_or(i64::MAX);
            let row = client.query_one(
                &format!(
                    "INSERT INTO incidents (kind, severity, region_id, location, lat, lng,
                                            affected_people, description, source, status)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active')
                     RETURNING {}",
                    INCIDENT_COLUMNS
                ),
                &[
                    &incident.kind.as_str(),
                    &incident.severity.as_str(),
                    &incident.region_id,
                    &incident.location,
                    &incident.lat,
                    &incident.lng,
                    &affected,
                    &incident.description,
                    &incident.source.as_str(),
                ],
            )?;
            incident_from_row(&row)
        })
        .await
    }

    async fn list_incidents(&self, status: Option<IncidentStatus>) -> StoreResult<Vec<Incident>> {
        let status = status.map(|s| s.as_str());
        self.run(move |client| {
            let rows = client.query(
                &format!(
                    "SELECT {} FROM incidents
                     WHERE ($1::TEXT IS NULL OR status = $1)
                     ORDER BY reported_at DESC, id DESC",
                    INCIDENT_COLUMNS
                ),
                &[&status],
            )?;
            collect_rows(rows, incident_from_row)
        })
        .await
    }

    async fn active_incidents(&self, kind: IncidentKind) -> StoreResult<Vec<Incident>> {
        self.run(move |client| {
            let rows = client.query(
                &format!(
                    "SELECT {} FROM incidents WHERE kind = $1 AND status = 'active'",
                    INCIDENT_COLUMNS
                ),
                &[&kind.as_str()],
            )?;
            collect_rows(rows, incident_from_row)
        })
        .await
    }

    async fn resolve_incident(&self, incident_id: i64, at: DateTime<Utc>) -> StoreResult<Incident> {
        self.run(move |client| {
            let row = client.query_opt(
                &format!(
                    "UPDATE incidents
                     SET status = 'resolved', resolved_at = COALESCE(resolved_at, $2)
                     WHERE id = $1
                     RETURNING {}",
                    INCIDENT_COLUMNS
                ),
                &[&incident_id, &at],
            )?;
            match row {
                Some(row) => incident_from_row(&row),
                None => Err(StoreError::NotFound {
                    entity: "incident",
                    id: incident_id,
                }),
            }
        })
        .await
    }

    async fn insert_responder(&self, responder: NewResponder) -> StoreResult<Responder> {
        self.run(move |client| {
            let row = client.query_one(
                &format!(
                    "INSERT INTO responders (name, role, phone, region_id, status)
                     VALUES ($1, $2, $3, $4, 'available')
                     RETURNING {}",
                    RESPONDER_COLUMNS
                ),
                &[&responder.name, &responder.role, &responder.phone, &responder.region_id],
            )?;
            responder_from_row(&row)
        })
        .await
    }

    async fn list_responders(&self, region_id: Option<i64>) -> StoreResult<Vec<Responder>> {
        self.run(move |client| {
            let rows = client.query(
                &format!(
                    "SELECT {} FROM responders
                     WHERE ($1::BIGINT IS NULL OR region_id = $1)
                     ORDER BY name",
                    RESPONDER_COLUMNS
                ),
                &[&region_id],
            )?;
            collect_rows(rows, responder_from_row)
        })
        .await
    }

    async fn dispatch_responder(&self, responder_id: i64, incident_id: i64) -> StoreResult<Responder> {
        self.run(move |client| {
            if client
                .query_opt("SELECT 1 FROM incidents WHERE id = $1", &[&incident_id])?
                .is_none()
            {
                return Err(StoreError::NotFound {
                    entity: "incident",
                    id: incident_id,
                });
            }
            let row = client.query_opt(
                &format!(
                    "UPDATE responders SET status = 'deployed', current_incident_id = $2
                     WHERE id = $1
                     RETURNING {}",
                    RESPONDER_COLUMNS
                ),
                &[&responder_id, &incident_id],
            )?;
            match row {
                Some(row) => responder_from_row(&row),
                None => Err(StoreError::NotFound {
                    entity: "responder",
                    id: responder_id,
                }),
            }
        })
        .await
    }

    async fn release_responder(&self, responder_id: i64) -> StoreResult<Responder> {
        self.run(move |client| {
            let row = client.query_opt(
                &format!(
                    "UPDATE responders SET status = 'available', current_incident_id = NULL
                     WHERE id = $1
                     RETURNING {}",
                    RESPONDER_COLUMNS
                ),
                &[&responder_id],
            )?;
            match row {
                Some(row) => responder_from_row(&row),
                None => Err(StoreError::NotFound {
                    entity: "responder",
                    id: responder_id,
                }),
            }
        })
        .await
    }

    async fn insert_refuge(&self, refuge: NewRefugeSite) -> StoreResult<RefugeSite> {
        self.run(move |client| {
            let capacity = i32::try_from(refuge.capacity).unwrap_or(i32::MAX);
            let row = client.query_one(
                &format!(
                    "INSERT INTO refuge_sites (name, region_id, lat, lng, capacity, kind)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING {}",
                    REFUGE_COLUMNS
                ),
                &[&refuge.name, &refuge.region_id, &refuge.lat, &refuge.lng, &capacity, &refuge.kind],
            )?;
            refuge_from_row(&row)
        })
        .await
    }

    async fn refuges_for_region(&self, region_id: i64) -> StoreResult<Vec<RefugeSite>> {
        self.run(move |client| {
            let rows = client.query(
                &format!(
                    "SELECT {} FROM refuge_sites WHERE region_id = $1 ORDER BY capacity DESC, id",
                    REFUGE_COLUMNS
                ),
                &[&region_id],
            )?;
            collect_rows(rows, refuge_from_row)
        })
        .await
    }

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        self.run(move |client| {
            let count = i32::try_from(notification.recipients_count).unwrap_or(i32::MAX);
            let row = client.query_one(
                &format!(
                    "INSERT INTO notifications (incident_id, message_en, message_sw, recipients_count, status)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING {}",
                    NOTIFICATION_COLUMNS
                ),
                &[
                    &notification.incident_id,
                    &notification.message_en,
                    &notification.message_sw,
                    &count,
                    &notification.status.as_str(),
                ],
            )?;
            notification_from_row(&row)
        })
        .await
    }

    async fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        self.run(|client| {
            let rows = client.query(
                &format!(
                    "SELECT {} FROM notifications ORDER BY sent_at DESC, id DESC",
                    NOTIFICATION_COLUMNS
                ),
                &[],
            )?;
            collect_rows(rows, notification_from_row)
        })
        .await
    }

    async fn cache_get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        let key = key.to_string();
        self.run(move |client| {
            let row = client.query_opt(
                "SELECT cache_key, value, generated_at FROM cache_entries WHERE cache_key = $1",
                &[&key],
            )?;
            row.map(|row| -> StoreResult<CacheEntry> {
                Ok(CacheEntry {
                    key: row.try_get("cache_key")?,
                    value: row.try_get("value")?,
                    generated_at: row.try_get("generated_at")?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn cache_upsert(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |client| {
            client.execute(
                "INSERT INTO cache_entries (cache_key, value, generated_at) VALUES ($1, $2, now())
                 ON CONFLICT (cache_key) DO UPDATE
                 SET value = EXCLUDED.value, generated_at = now()",
                &[&key, &value],
            )?;
            Ok(())
        })
        .await
    }
}
