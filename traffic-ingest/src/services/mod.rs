//! Ingestion pipeline services
//!
//! - `ingestion_coordinator`: synchronous accept-and-store path
//! - `enrichment_worker`: background classification write-back
//! - `classifier_client`: HTTP client for the classification service

pub mod classifier_client;
pub mod enrichment_worker;
pub mod ingestion_coordinator;

pub use classifier_client::{
    ClassificationService, ClassifierClient, ClassifierError, RemoteClassification,
};
pub use enrichment_worker::{EnrichmentFailure, EnrichmentOutcome, EnrichmentWorker};
pub use ingestion_coordinator::{IngestError, IngestionCoordinator};
