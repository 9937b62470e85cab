#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use rescuemap_backend::alert::{AlertDispatcher, DeepLinkBuilder};
use rescuemap_backend::api::AppState;
use rescuemap_backend::location::{LocationTracker, PushOnlyGeolocator};
use rescuemap_backend::markers::MapState;
use rescuemap_backend::places::{OverpassResponse, PlaceFinder, PlaceIndex, DEFAULT_RADIUS_METERS};
use rescuemap_backend::routing::{OsrmResponse, RouteCalculator, RoutingService};
use rescuemap_backend::selection::SelectionController;
use rescuemap_backend::{FacilityQuery, Position, ProviderError};

pub const TIMEOUT: Duration = Duration::from_secs(12);

/// A canned provider answer, optionally held back until released
pub struct Reply<T> {
    result: Result<T, ProviderError>,
    started: Option<oneshot::Sender<()>>,
    release: Option<oneshot::Receiver<()>>,
    hang: bool,
}

/// Test-side handle of a gated reply
pub struct Gate {
    pub started: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl<T> Reply<T> {
    pub fn ready(result: Result<T, ProviderError>) -> Self {
        Self {
            result,
            started: None,
            release: None,
            hang: false,
        }
    }

    pub fn gated(result: Result<T, ProviderError>) -> (Self, Gate) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let reply = Self {
            result,
            started: Some(started_tx),
            release: Some(release_rx),
            hang: false,
        };
        (
            reply,
            Gate {
                started: started_rx,
                release: release_tx,
            },
        )
    }

    /// Never answers
    pub fn hang(result: Result<T, ProviderError>) -> Self {
        Self {
            result,
            started: None,
            release: None,
            hang: true,
        }
    }

    async fn deliver(self) -> Result<T, ProviderError> {
        if let Some(started) = self.started {
            let _ = started.send(());
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(release) = self.release {
            let _ = release.await;
        }
        self.result
    }
}

pub struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    calls: AtomicUsize,
}

impl<T> Script<T> {
    pub fn new(replies: Vec<Reply<T>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Reply<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected provider call")
    }
}

pub type ScriptedPlaces = Script<OverpassResponse>;
pub type ScriptedRoutes = Script<OsrmResponse>;

#[async_trait]
impl PlaceIndex for Script<OverpassResponse> {
    async fn query(&self, _query: &FacilityQuery) -> Result<OverpassResponse, ProviderError> {
        let reply = self.next();
        reply.deliver().await
    }
}

#[async_trait]
impl RoutingService for Script<OsrmResponse> {
    async fn routes(
        &self,
        _origin: Position,
        _destination: Position,
    ) -> Result<OsrmResponse, ProviderError> {
        let reply = self.next();
        reply.deliver().await
    }
}

pub fn overpass(json: &str) -> OverpassResponse {
    serde_json::from_str(json).expect("valid overpass fixture")
}

pub fn osrm(json: &str) -> OsrmResponse {
    serde_json::from_str(json).expect("valid osrm fixture")
}

pub fn pos(lat: f64, lon: f64) -> Position {
    Position::new(lat, lon).unwrap()
}

/// Three hospitals, the second without name or phone
pub const THREE_HOSPITALS: &str = r#"{"elements":[
    {"type":"node","id":101,"lat":12.91,"lon":77.61,"tags":{"name":"City Hospital","phone":"+91 80 2222 3333"}},
    {"type":"node","id":102,"lat":12.92,"lon":77.62,"tags":{"amenity":"hospital"}},
    {"type":"node","id":103,"lat":12.93,"lon":77.63,"tags":{"name":"St. Martha's"}}
]}"#;

pub const TWO_POLICE: &str = r#"{"elements":[
    {"type":"node","id":201,"lat":12.95,"lon":77.58,"tags":{"name":"Central Station","phone":"100"}},
    {"type":"node","id":202,"lat":12.88,"lon":77.64,"tags":{"name":"South Station"}}
]}"#;

pub const ONE_ROUTE: &str = r#"{"code":"Ok","routes":[
    {"geometry":{"type":"LineString","coordinates":[[77.6,12.9],[77.58,12.95]]},"distance":6100.0,"duration":720.0}
]}"#;

/// Two alternatives; the second spans a much larger area
pub const TWO_ROUTES: &str = r#"{"code":"Ok","routes":[
    {"geometry":{"type":"LineString","coordinates":[[77.6,12.9],[77.605,12.905],[77.61,12.91]]},"distance":1800.0,"duration":240.0},
    {"geometry":{"type":"LineString","coordinates":[[77.6,12.9],[77.5,12.7],[77.61,12.91]]},"distance":5200.0,"duration":600.0}
]}"#;

pub struct Harness {
    pub map: MapState,
    pub tracker: Arc<LocationTracker>,
    pub places: Arc<ScriptedPlaces>,
    pub routes: Arc<ScriptedRoutes>,
    pub router: RouteCalculator,
    pub controller: Arc<SelectionController>,
}

impl Harness {
    pub fn new(places: Vec<Reply<OverpassResponse>>, routes: Vec<Reply<OsrmResponse>>) -> Self {
        Self::with_contacts(places, routes, vec!["+1A".to_string(), "+1B".to_string()])
    }

    pub fn with_contacts(
        places: Vec<Reply<OverpassResponse>>,
        routes: Vec<Reply<OsrmResponse>>,
        contacts: Vec<String>,
    ) -> Self {
        let map = MapState::new();
        let links = Arc::new(DeepLinkBuilder);
        let tracker = Arc::new(LocationTracker::new(
            Arc::new(PushOnlyGeolocator),
            map.clone(),
        ));
        let places = Arc::new(ScriptedPlaces::new(places));
        let routes = Arc::new(ScriptedRoutes::new(routes));

        let finder = PlaceFinder::new(places.clone(), DEFAULT_RADIUS_METERS, TIMEOUT);
        let router = RouteCalculator::new(routes.clone(), map.clone(), TIMEOUT);
        let alerts = AlertDispatcher::new(links.clone(), links.clone());
        let controller = Arc::new(SelectionController::new(
            tracker.reader(),
            finder,
            router.clone(),
            map.clone(),
            alerts,
            links,
            contacts,
        ));

        Self {
            map,
            tracker,
            places,
            routes,
            router,
            controller,
        }
    }

    /// Harness with a fix at (12.9, 77.6)
    pub async fn located(
        places: Vec<Reply<OverpassResponse>>,
        routes: Vec<Reply<OsrmResponse>>,
    ) -> Self {
        let harness = Self::new(places, routes);
        harness.tracker.record_fix(pos(12.9, 77.6)).await;
        harness
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            controller: self.controller.clone(),
            tracker: self.tracker.clone(),
            map: self.map.clone(),
        }
    }

    pub async fn facility_names(&self) -> Vec<String> {
        self.map
            .read()
            .await
            .facilities()
            .map(|r| r.display_name.clone())
            .collect()
    }
}
