use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::IF_NONE_MATCH, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    db::{Acknowledgment, Alert, EmergencyContact, Medication, PatientProfile, VitalReading},
    thresholds::ThresholdConfig,
};

use super::{
    RemoteError, RemoteResult, RemoteStore, ALERTS_COLLECTION, CONFIG_COLLECTION,
    CONTACTS_COLLECTION, MEDICATIONS_COLLECTION, PATIENTS_COLLECTION, THRESHOLDS_DOCUMENT,
    VITALS_COLLECTION,
};

/// REST mapping of the document store:
/// `PUT {base}/{collection}/{id}`, `GET {base}/{collection}/{id}`,
/// `GET {base}/{collection}?field=value`, `PATCH {base}/alerts/{id}`.
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgePatch<'a> {
    acknowledged: bool,
    #[serde(flatten)]
    acknowledgment: &'a Acknowledgment,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Unavailable(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            timeout,
        })
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Unavailable(err.to_string())
        }
    }

    async fn put_document<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        body: &T,
    ) -> RemoteResult<()> {
        let response = self
            .send(self.client.put(self.document_url(collection, id)).json(body))
            .await?;
        ensure_success(response, collection, id).await.map(|_| ())
    }

    fn create_request<T: Serialize + ?Sized>(&self, collection: &str, id: &str, body: &T) -> RequestBuilder {
        self.client
            .put(self.document_url(collection, id))
            .header(IF_NONE_MATCH, "*")
            .json(body)
    }

    /// PUT that only creates. An existing document answers 412 and is kept.
    async fn create_document<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        body: &T,
    ) -> RemoteResult<()> {
        let response = self.send(self.create_request(collection, id, body)).await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(());
        }
        ensure_success(response, collection, id).await.map(|_| ())
    }

    async fn get_document<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> RemoteResult<Option<T>> {
        let response = self
            .send(self.client.get(self.document_url(collection, id)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, collection, id).await?;
        self.decode(response).await.map(Some)
    }

    async fn query<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> RemoteResult<Vec<T>> {
        let response = self
            .send(
                self.client
                    .get(self.collection_url(collection))
                    .query(&[(field, value)]),
            )
            .await?;
        let response = ensure_success(response, collection, "").await?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> RemoteResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| self.map_transport_error(err))
    }
}

async fn ensure_success(response: Response, collection: &str, id: &str) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound {
            collection: collection.into(),
            id: id.into(),
        });
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn put_vital(&self, reading: &VitalReading) -> RemoteResult<()> {
        let body = VitalReading {
            synced: true,
            ..reading.clone()
        };
        self.put_document(VITALS_COLLECTION, &reading.id, &body).await
    }

    async fn put_contact(&self, contact: &EmergencyContact) -> RemoteResult<()> {
        let body = EmergencyContact {
            synced: true,
            ..contact.clone()
        };
        self.put_document(CONTACTS_COLLECTION, &contact.id, &body).await
    }

    async fn put_medication(&self, medication: &Medication) -> RemoteResult<()> {
        let body = Medication {
            synced: true,
            ..medication.clone()
        };
        self.put_document(MEDICATIONS_COLLECTION, &medication.id, &body)
            .await
    }

    async fn fetch_contacts(&self, patient_id: &str) -> RemoteResult<Vec<EmergencyContact>> {
        self.query(CONTACTS_COLLECTION, "patientId", patient_id).await
    }

    async fn fetch_medications(&self, patient_id: &str) -> RemoteResult<Vec<Medication>> {
        self.query(MEDICATIONS_COLLECTION, "patientId", patient_id).await
    }

    async fn fetch_patient(&self, patient_id: &str) -> RemoteResult<Option<PatientProfile>> {
        self.get_document(PATIENTS_COLLECTION, patient_id).await
    }

    async fn load_thresholds(&self) -> RemoteResult<Option<ThresholdConfig>> {
        self.get_document(CONFIG_COLLECTION, THRESHOLDS_DOCUMENT).await
    }

    async fn save_thresholds(&self, config: &ThresholdConfig) -> RemoteResult<()> {
        self.put_document(CONFIG_COLLECTION, THRESHOLDS_DOCUMENT, config)
            .await
    }

    async fn put_alert(&self, alert: &Alert) -> RemoteResult<()> {
        self.create_document(ALERTS_COLLECTION, &alert.id, alert).await
    }

    async fn acknowledge_alert(
        &self,
        alert_id: &str,
        acknowledgment: &Acknowledgment,
    ) -> RemoteResult<Alert> {
        let patch = AcknowledgePatch {
            acknowledged: true,
            acknowledgment,
        };
        let response = self
            .send(
                self.client
                    .patch(self.document_url(ALERTS_COLLECTION, alert_id))
                    .json(&patch),
            )
            .await?;
        let response = ensure_success(response, ALERTS_COLLECTION, alert_id).await?;
        self.decode(response).await
    }

    async fn list_alerts(&self, doctor_id: &str) -> RemoteResult<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self.query(ALERTS_COLLECTION, "doctorId", doctor_id).await?;
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let store =
            HttpRemoteStore::new("https://store.example/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.document_url(VITALS_COLLECTION, "p1:heartRate:1"),
            "https://store.example/api/vitals/p1:heartRate:1"
        );
        assert_eq!(
            store.collection_url(ALERTS_COLLECTION),
            "https://store.example/api/alerts"
        );
    }

    #[test]
    fn alert_push_only_creates() {
        let store = HttpRemoteStore::new("https://store.example/api", None, Duration::from_secs(5)).unwrap();
        let request = store
            .create_request(ALERTS_COLLECTION, "a1", &serde_json::json!({ "id": "a1" }))
            .build()
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::PUT);
        assert_eq!(request.url().as_str(), "https://store.example/api/alerts/a1");
        let header = request.headers().get(IF_NONE_MATCH).unwrap();
        assert_eq!(header.to_str().unwrap(), "*");
    }

    #[test]
    fn acknowledge_patch_carries_all_fields_at_once() {
        let acknowledgment = Acknowledgment {
            acknowledged_by: "d1".into(),
            acknowledged_by_name: "Dr. Lin".into(),
            acknowledged_at: Utc::now(),
        };
        let json = serde_json::to_value(AcknowledgePatch {
            acknowledged: true,
            acknowledgment: &acknowledgment,
        })
        .unwrap();
        assert_eq!(json["acknowledged"], true);
        assert_eq!(json["acknowledgedBy"], "d1");
        assert_eq!(json["acknowledgedByName"], "Dr. Lin");
        assert!(json.get("acknowledgedAt").is_some());
    }
}
