//! Alerting: risk bands, staleness checks, SMS composition and delivery,
//! and the dispatch step that ties them to an incident.

pub mod bulletin;
pub mod sms;
pub mod stalenesses;
pub mod thresholds;

use tracing::info;

use crate::cache::ResultCache;
use crate::generate::TextGeneration;
use crate::logging::DataSource;
use crate::model::{NewNotification, Notification, NotificationStatus, StoreError};
use crate::store::{Store, StoreResult};

use self::sms::{DeliveryReport, SmsGateway};

/// Delivery outcome folded into a notification status.
pub fn notification_status(report: &DeliveryReport) -> NotificationStatus {
    match (report.sent, report.failed) {
        (0, _) => NotificationStatus::Failed,
        (_, 0) => NotificationStatus::Sent,
        _ => NotificationStatus::Partial,
    }
}

/// Everything needed to alert responders about an incident.
pub struct Notifier<'a> {
    pub store: &'a dyn Store,
    pub generator: &'a dyn TextGeneration,
    pub cache: &'a ResultCache,
    pub gateway: &'a dyn SmsGateway,
}

impl Notifier<'_> {
    /// Compose the bilingual alert for `incident_id`, text it to the
    /// responders of the incident's region (every responder when the
    /// incident has no region), and append a notification record.
    ///
    /// The alert points people at the region's refuge sites, largest first.
    /// The English text is what is sent; both languages are recorded.
    /// Delivery problems end up in the record's status; only storage
    /// failures are returned as errors.
    pub async fn notify_incident(&self, incident_id: i64) -> StoreResult<Notification> {
        let incident = self
            .store
            .list_incidents(None)
            .await?
            .into_iter()
            .find(|i| i.id == incident_id)
            .ok_or(StoreError::NotFound {
                entity: "incident",
                id: incident_id,
            })?;

        let region_name = match incident.region_id {
            Some(region_id) => self
                .store
                .list_regions()
                .await?
                .into_iter()
                .find(|r| r.id == region_id)
                .map(|r| r.name),
            None => None,
        };

        let refuges: Vec<String> = match incident.region_id {
            Some(region_id) => self
                .store
                .refuges_for_region(region_id)
                .await?
                .into_iter()
                .map(|r| r.name)
                .collect(),
            None => Vec::new(),
        };

        let responders = self.store.list_responders(incident.region_id).await?;
        let phones: Vec<String> = responders.into_iter().map(|r| r.phone).collect();

        let bulletin =
            bulletin::compose_sms(self.generator, self.cache, &incident, region_name.as_deref(), &refuges).await;
        let report = self.gateway.send(&phones, &bulletin.english).await;
        let status = notification_status(&report);

        info!(
            source = %DataSource::Sms,
            incident = incident.id,
            sent = report.sent,
            failed = report.failed,
            mock = report.mock,
            status = status.as_str(),
            "incident notification dispatched"
        );

        self.store
            .insert_notification(NewNotification {
                incident_id: incident.id,
                message_en: bulletin.english,
                message_sw: bulletin.swahili,
                recipients_count: report.sent,
                status,
            })
            .await
    }
}
