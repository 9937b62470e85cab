use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::alert::{phone_digits, AlertDispatcher, AlertReceipt, DeepLink, Dialer};
use crate::generation::Generation;
use crate::location::LocationReader;
use crate::markers::MapState;
use crate::places::PlaceFinder;
use crate::routing::RouteCalculator;
use crate::{
    FacilityCategory, FacilityRecord, Position, RescuemapError, Result, RouteCandidate,
};

/// One selectable facility
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub index: usize,
    pub record: FacilityRecord,
    /// False when the record has no phone number
    pub call_enabled: bool,
}

/// Facilities offered to the user from one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceSet {
    pub generation: Generation,
    pub category: FacilityCategory,
    pub choices: Vec<Choice>,
}

impl ChoiceSet {
    fn new(
        generation: Generation,
        category: FacilityCategory,
        records: Vec<FacilityRecord>,
    ) -> Self {
        let choices = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| Choice {
                index,
                call_enabled: record.phone.is_some(),
                record,
            })
            .collect();
        Self {
            generation,
            category,
            choices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionAction {
    Navigate,
    Call,
    VideoCall,
    Cancel,
}

/// What the user picked from a [`ChoiceSet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub generation: Generation,
    #[serde(default)]
    pub choice: Option<usize>,
    pub action: SelectionAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectionOutcome {
    RouteDisplayed {
        destination: Position,
        candidates: Vec<RouteCandidate>,
    },
    CallPlaced {
        number: String,
        link: DeepLink,
    },
    VideoCallPlaced {
        number: String,
        link: DeepLink,
    },
    Cancelled,
}

/// Runs searches, holds the offered choices and dispatches the user's pick
pub struct SelectionController {
    location: LocationReader,
    finder: PlaceFinder,
    router: RouteCalculator,
    map: MapState,
    alerts: AlertDispatcher,
    dialer: Arc<dyn Dialer>,
    contacts: Vec<String>,
    pending: Mutex<Option<ChoiceSet>>,
}

impl SelectionController {
    pub fn new(
        location: LocationReader,
        finder: PlaceFinder,
        router: RouteCalculator,
        map: MapState,
        alerts: AlertDispatcher,
        dialer: Arc<dyn Dialer>,
        contacts: Vec<String>,
    ) -> Self {
        Self {
            location,
            finder,
            router,
            map,
            alerts,
            dialer,
            contacts,
            pending: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &LocationReader {
        &self.location
    }

    /// Choices currently offered, if any
    pub async fn pending_choices(&self) -> Option<ChoiceSet> {
        self.pending.lock().await.clone()
    }

    /// Search around the current position and offer the results.
    ///
    /// The map is replaced only when this is still the newest search; an
    /// empty result clears the previous pins before reporting `EmptyResult`.
    pub async fn search(&self, category: FacilityCategory) -> Result<ChoiceSet> {
        let origin = self.location.current_position()?;
        let ticket = self.map.begin_facility_query().await;

        match self.finder.find_nearby(origin, category).await {
            Ok(records) => {
                self.map.apply_facilities(ticket, &records).await?;
                let set = ChoiceSet::new(ticket, category, records);
                self.offer(set.clone()).await;
                Ok(set)
            }
            Err(e @ RescuemapError::EmptyResult { .. }) => {
                self.map.apply_facilities(ticket, &[]).await?;
                self.withdraw_older_than(ticket).await;
                Err(e)
            }
            Err(e) => {
                if !self.map.is_facility_query_current(ticket).await {
                    debug!("Dropping failure of superseded search: {}", e);
                    return Err(RescuemapError::Superseded);
                }
                Err(e)
            }
        }
    }

    /// Act on the user's pick.
    ///
    /// The offered set is discarded after a route is shown or a call is
    /// placed. A failed navigation or a missing phone keeps it for retry.
    pub async fn choose(&self, selection: Selection) -> Result<SelectionOutcome> {
        let record = {
            let mut pending = self.pending.lock().await;
            let set = pending.as_ref().ok_or(RescuemapError::NoSelection)?;
            if set.generation != selection.generation {
                return Err(RescuemapError::StaleSelection {
                    requested: selection.generation.0,
                    current: set.generation.0,
                });
            }
            if selection.action == SelectionAction::Cancel {
                *pending = None;
                return Ok(SelectionOutcome::Cancelled);
            }
            let index = selection.choice.ok_or(RescuemapError::NoSelection)?;
            set.choices
                .get(index)
                .map(|choice| choice.record.clone())
                .ok_or(RescuemapError::UnknownChoice(index))?
        };

        let outcome = match selection.action {
            SelectionAction::Navigate => {
                let candidates = self
                    .router
                    .route_from(&self.location, record.position)
                    .await?;
                SelectionOutcome::RouteDisplayed {
                    destination: record.position,
                    candidates,
                }
            }
            SelectionAction::Call => {
                let number = record.phone.ok_or(RescuemapError::NoPhone)?;
                let link = self.dialer.dial(&number);
                SelectionOutcome::CallPlaced { number, link }
            }
            SelectionAction::VideoCall => {
                let number = record
                    .phone
                    .map(|p| phone_digits(&p))
                    .filter(|digits| !digits.is_empty())
                    .ok_or(RescuemapError::NoPhone)?;
                let link = self.dialer.video_call(&number);
                SelectionOutcome::VideoCallPlaced { number, link }
            }
            SelectionAction::Cancel => SelectionOutcome::Cancelled,
        };

        info!("Selection {:?} completed: {:?}", selection.generation, selection.action);
        self.discard(selection.generation).await;
        Ok(outcome)
    }

    /// Broadcast the SOS to the configured contacts
    pub fn sos(&self) -> Result<AlertReceipt> {
        self.alerts
            .send_alert(self.location.current_position().ok(), &self.contacts)
    }

    /// Remove pins and routes and drop the offered choices
    pub async fn clear_display(&self) {
        self.map.clear_all().await;
        *self.pending.lock().await = None;
    }

    async fn offer(&self, set: ChoiceSet) {
        let mut pending = self.pending.lock().await;
        if pending
            .as_ref()
            .map_or(true, |current| current.generation < set.generation)
        {
            *pending = Some(set);
        }
    }

    async fn withdraw_older_than(&self, ticket: Generation) {
        let mut pending = self.pending.lock().await;
        if pending
            .as_ref()
            .is_some_and(|current| current.generation < ticket)
        {
            *pending = None;
        }
    }

    async fn discard(&self, generation: Generation) {
        let mut pending = self.pending.lock().await;
        if pending
            .as_ref()
            .is_some_and(|current| current.generation == generation)
        {
            *pending = None;
        }
    }
}
