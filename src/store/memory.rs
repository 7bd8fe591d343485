//! In-process store for tests and dev mode.
//!
//! Each operation holds the table lock for its whole body and never across
//! an await, so every write is atomic per row exactly like the database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Store, StoreResult};
use crate::model::{
    CacheEntry, Incident, IncidentKind, IncidentStatus, NewIncident, NewNotification, NewRefugeSite,
    NewResponder, Notification, RefugeSite, Region, Responder, ResponderStatus, RiskScore, StoreError,
};
use crate::regions::RegionSeed;

#[derive(Default)]
struct Tables {
    next_id: i64,
    regions: Vec<Region>,
    incidents: Vec<Incident>,
    responders: Vec<Responder>,
    refuges: Vec<RefugeSite>,
    notifications: Vec<Notification>,
    cache: HashMap<String, CacheEntry>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

fn responder_mut(tables: &mut Tables, responder_id: i64) -> StoreResult<&mut Responder> {
    tables
        .responders
        .iter_mut()
        .find(|r| r.id == responder_id)
        .ok_or(StoreError::NotFound {
            entity: "responder",
            id: responder_id,
        })
}

#[async_trait]
impl Store for InMemoryStore {
    async fn seed_regions(&self, seeds: &[RegionSeed]) -> StoreResult<usize> {
        let mut tables = self.tables()?;
        let mut inserted = 0;
        for seed in seeds {
            if tables.regions.iter().any(|r| r.name == seed.name) {
                continue;
            }
            let id = tables.allocate_id();
            tables.regions.push(Region {
                id,
                name: seed.name.to_string(),
                area: seed.area.to_string(),
                lat: seed.latitude,
                lng: seed.longitude,
                risk_score: RiskScore::default(),
                last_updated: None,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_regions(&self) -> StoreResult<Vec<Region>> {
        let mut regions = self.tables()?.regions.clone();
        regions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(regions)
    }

    async fn update_region_risk(&self, region_id: i64, score: RiskScore, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let region = tables
            .regions
            .iter_mut()
            .find(|r| r.id == region_id)
            .ok_or(StoreError::NotFound {
                entity: "region",
                id: region_id,
            })?;
        region.risk_score = score;
        region.last_updated = Some(at);
        Ok(())
    }

    async fn insert_incident(&self, incident: NewIncident) -> StoreResult<Incident> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        let row = Incident {
            id,
            kind: incident.kind,
            severity: incident.severity,
            region_id: incident.region_id,
            location: incident.location,
            lat: incident.lat,
            lng: incident.lng,
            affected_people: incident.affected_people,
            description: incident.description,
            source: incident.source,
            status: IncidentStatus::Active,
            reported_at: Utc::now(),
            resolved_at: None,
        };
        tables.incidents.push(row.clone());
        Ok(row)
    }

    async fn list_incidents(&self, status: Option<IncidentStatus>) -> StoreResult<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .tables()?
            .incidents
            .iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.reported_at.cmp(&a.reported_at).then(b.id.cmp(&a.id)));
        Ok(incidents)
    }

    async fn active_incidents(&self, kind: IncidentKind) -> StoreResult<Vec<Incident>> {
        Ok(self
            .tables()?
            .incidents
            .iter()
            .filter(|i| i.kind == kind && i.is_active())
            .cloned()
            .collect())
    }

    async fn resolve_incident(&self, incident_id: i64, at: DateTime<Utc>) -> StoreResult<Incident> {
        let mut tables = self.tables()?;
        let incident = tables
            .incidents
            .iter_mut()
            .find(|i| i.id == incident_id)
            .ok_or(StoreError::NotFound {
                entity: "incident",
                id: incident_id,
            })?;
        if incident.is_active() {
            incident.status = IncidentStatus::Resolved;
            incident.resolved_at = Some(at);
        }
        Ok(incident.clone())
    }

    async fn insert_responder(&self, responder: NewResponder) -> StoreResult<Responder> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        let row = Responder {
            id,
            name: responder.name,
            role: responder.role,
            phone: responder.phone,
            region_id: responder.region_id,
            status: ResponderStatus::Available,
            current_incident_id: None,
        };
        tables.responders.push(row.clone());
        Ok(row)
    }

    async fn list_responders(&self, region_id: Option<i64>) -> StoreResult<Vec<Responder>> {
        let mut responders: Vec<Responder> = self
            .tables()?
            .responders
            .iter()
            .filter(|r| region_id.is_none() || r.region_id == region_id)
            .cloned()
            .collect();
        responders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(responders)
    }

    async fn dispatch_responder(&self, responder_id: i64, incident_id: i64) -> StoreResult<Responder> {
        let mut tables = self.tables()?;
        if !tables.incidents.iter().any(|i| i.id == incident_id) {
            return Err(StoreError::NotFound {
                entity: "incident",
                id: incident_id,
            });
        }
        let responder = responder_mut(&mut tables, responder_id)?;
        responder.status = ResponderStatus::Deployed;
        responder.current_incident_id = Some(incident_id);
        Ok(responder.clone())
    }

    async fn release_responder(&self, responder_id: i64) -> StoreResult<Responder> {
        let mut tables = self.tables()?;
        let responder = responder_mut(&mut tables, responder_id)?;
        responder.status = ResponderStatus::Available;
        responder.current_incident_id = None;
        Ok(responder.clone())
    }

    async fn insert_refuge(&self, refuge: NewRefugeSite) -> StoreResult<RefugeSite> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        let row = RefugeSite {
            id,
            name: refuge.name,
            region_id: refuge.region_id,
            lat: refuge.lat,
            lng: refuge.lng,
            capacity: refuge.capacity,
            kind: refuge.kind,
        };
        tables.refuges.push(row.clone());
        Ok(row)
    }

    async fn refuges_for_region(&self, region_id: i64) -> StoreResult<Vec<RefugeSite>> {
        let mut refuges: Vec<RefugeSite> = self
            .tables()?
            .refuges
            .iter()
            .filter(|r| r.region_id == Some(region_id))
            .cloned()
            .collect();
        refuges.sort_by(|a, b| b.capacity.cmp(&a.capacity).then(a.id.cmp(&b.id)));
        Ok(refuges)
    }

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        let mut tables = self.tables()?;
        let id = tables.allocate_id();
        let row = Notification {
            id,
            incident_id: notification.incident_id,
            message_en: notification.message_en,
            message_sw: notification.message_sw,
            recipients_count: notification.recipients_count,
            sent_at: Utc::now(),
            status: notification.status,
        };
        tables.notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        let mut notifications = self.tables()?.notifications.clone();
        notifications.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    async fn cache_get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        Ok(self.tables()?.cache.get(key).cloned())
    }

    async fn cache_upsert(&self, key: &str, value: &str) -> StoreResult<()> {
        self.tables()?.cache.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value: value.to_string(),
                generated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
