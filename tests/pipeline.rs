mod common;

use common::*;
use rescuemap_backend::alert::{DeepLink, DeepLinkKind};
use rescuemap_backend::generation::Generation;
use rescuemap_backend::markers::Viewport;
use rescuemap_backend::selection::{Selection, SelectionAction, SelectionOutcome};
use rescuemap_backend::{FacilityCategory, ProviderError, RescuemapError};

fn pick(generation: Generation, choice: usize, action: SelectionAction) -> Selection {
    Selection {
        generation,
        choice: Some(choice),
        action,
    }
}

#[tokio::test]
async fn fallback_name_for_unnamed_facility() {
    let h = Harness::located(vec![Reply::ready(Ok(overpass(THREE_HOSPITALS)))], vec![]).await;

    let set = h.controller.search(FacilityCategory::Hospital).await.unwrap();

    assert_eq!(set.choices.len(), 3);
    let unnamed = &set.choices[1];
    assert_eq!(unnamed.record.display_name, "🏥 Hospital");
    assert_eq!(unnamed.record.phone, None);
    assert!(!unnamed.call_enabled);
    assert!(set.choices[0].call_enabled);
    assert_eq!(
        h.facility_names().await,
        vec!["City Hospital", "🏥 Hospital", "St. Martha's"]
    );
}

#[tokio::test]
async fn zero_elements_is_reported_as_empty_result() {
    let h = Harness::located(
        vec![
            Reply::ready(Ok(overpass(TWO_POLICE))),
            Reply::ready(Ok(overpass(r#"{"elements":[]}"#))),
        ],
        vec![],
    )
    .await;
    h.controller.search(FacilityCategory::Police).await.unwrap();

    let result = h.controller.search(FacilityCategory::Hospital).await;

    assert!(matches!(result, Err(RescuemapError::EmptyResult { .. })));
    assert!(h.facility_names().await.is_empty());
    assert!(h.controller.pending_choices().await.is_none());
}

#[tokio::test]
async fn second_search_replaces_first() {
    let h = Harness::located(
        vec![
            Reply::ready(Ok(overpass(THREE_HOSPITALS))),
            Reply::ready(Ok(overpass(TWO_POLICE))),
        ],
        vec![],
    )
    .await;

    h.controller.search(FacilityCategory::Hospital).await.unwrap();
    h.controller.search(FacilityCategory::Police).await.unwrap();

    assert_eq!(
        h.facility_names().await,
        vec!["Central Station", "South Station"]
    );
}

#[tokio::test]
async fn late_response_of_superseded_query_is_discarded() {
    let (slow, gate) = Reply::gated(Ok(overpass(THREE_HOSPITALS)));
    let h = Harness::located(vec![slow, Reply::ready(Ok(overpass(TWO_POLICE)))], vec![]).await;

    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.search(FacilityCategory::Hospital).await });
    gate.started.await.unwrap();

    let second = h.controller.search(FacilityCategory::Police).await.unwrap();
    gate.release.send(()).unwrap();
    let first = first.await.unwrap();

    assert_eq!(first, Err(RescuemapError::Superseded));
    assert_eq!(
        h.facility_names().await,
        vec!["Central Station", "South Station"]
    );
    let pending = h.controller.pending_choices().await.unwrap();
    assert_eq!(pending.generation, second.generation);
}

#[tokio::test]
async fn network_failure_leaves_previous_pins() {
    let h = Harness::located(
        vec![
            Reply::ready(Ok(overpass(TWO_POLICE))),
            Reply::ready(Err(ProviderError::Status(504))),
        ],
        vec![],
    )
    .await;
    let offered = h.controller.search(FacilityCategory::Police).await.unwrap();

    let result = h.controller.search(FacilityCategory::Hospital).await;

    assert!(matches!(result, Err(RescuemapError::Network(_))));
    assert_eq!(
        h.facility_names().await,
        vec!["Central Station", "South Station"]
    );
    assert_eq!(h.controller.pending_choices().await, Some(offered));
}

#[tokio::test]
async fn search_without_fix_never_queries() {
    let h = Harness::new(vec![], vec![]);

    let result = h.controller.search(FacilityCategory::Hospital).await;

    assert_eq!(result, Err(RescuemapError::PositionUnavailable));
    assert_eq!(h.places.calls(), 0);
}

#[tokio::test]
async fn navigate_draws_all_alternatives_and_frames_primary() {
    let h = Harness::located(
        vec![Reply::ready(Ok(overpass(THREE_HOSPITALS)))],
        vec![Reply::ready(Ok(osrm(TWO_ROUTES)))],
    )
    .await;
    let set = h.controller.search(FacilityCategory::Hospital).await.unwrap();

    let outcome = h
        .controller
        .choose(pick(set.generation, 0, SelectionAction::Navigate))
        .await
        .unwrap();

    let SelectionOutcome::RouteDisplayed {
        destination,
        candidates,
    } = outcome
    else {
        panic!("expected a route outcome");
    };
    assert_eq!(destination, pos(12.91, 77.61));
    assert_eq!(candidates.len(), 2);

    let markers = h.map.read().await;
    assert_eq!(markers.route_count(), 2);
    assert_eq!(
        markers.viewport(),
        Viewport::Bounds {
            bounds: candidates[0].bounding_box().unwrap()
        }
    );
    drop(markers);
    assert!(h.controller.pending_choices().await.is_none());
}

#[tokio::test]
async fn empty_route_set_clears_overlays() {
    let h = Harness::located(
        vec![],
        vec![
            Reply::ready(Ok(osrm(TWO_ROUTES))),
            Reply::ready(Ok(osrm(r#"{"code":"Ok","routes":[]}"#))),
        ],
    )
    .await;
    h.router.route(pos(12.9, 77.6), pos(12.91, 77.61)).await.unwrap();
    assert_eq!(h.map.read().await.route_count(), 2);

    let result = h.router.route(pos(12.9, 77.6), pos(12.91, 77.61)).await;

    assert_eq!(result, Err(RescuemapError::NoRoute));
    assert_eq!(h.map.read().await.route_count(), 0);
}

#[tokio::test]
async fn failed_navigation_keeps_selection() {
    let h = Harness::located(
        vec![Reply::ready(Ok(overpass(TWO_POLICE)))],
        vec![
            Reply::ready(Ok(osrm(r#"{"code":"NoRoute","message":"Impossible route"}"#))),
            Reply::ready(Ok(osrm(TWO_ROUTES))),
        ],
    )
    .await;
    let set = h.controller.search(FacilityCategory::Police).await.unwrap();

    let failed = h
        .controller
        .choose(pick(set.generation, 1, SelectionAction::Navigate))
        .await;
    assert_eq!(failed, Err(RescuemapError::NoRoute));
    assert_eq!(h.map.read().await.route_count(), 0);

    h.controller
        .choose(pick(set.generation, 1, SelectionAction::Navigate))
        .await
        .unwrap();
    assert_eq!(h.map.read().await.route_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_router_times_out() {
    let h = Harness::located(vec![], vec![Reply::hang(Ok(osrm(TWO_ROUTES)))]).await;

    let result = h.router.route(pos(12.9, 77.6), pos(12.91, 77.61)).await;

    assert!(matches!(result, Err(RescuemapError::Network(_))));
    assert_eq!(h.map.read().await.route_count(), 0);
}

#[tokio::test]
async fn late_route_of_superseded_request_is_discarded() {
    let (slow, gate) = Reply::gated(Ok(osrm(TWO_ROUTES)));
    let h = Harness::located(vec![], vec![slow, Reply::ready(Ok(osrm(ONE_ROUTE)))]).await;

    let router = h.router.clone();
    let first =
        tokio::spawn(async move { router.route(pos(12.9, 77.6), pos(12.91, 77.61)).await });
    gate.started.await.unwrap();

    let second = h
        .router
        .route(pos(12.9, 77.6), pos(12.95, 77.58))
        .await
        .unwrap();
    gate.release.send(()).unwrap();

    assert_eq!(first.await.unwrap(), Err(RescuemapError::Superseded));
    let markers = h.map.read().await;
    assert_eq!(markers.route_count(), 1);
    assert_eq!(
        markers.viewport(),
        Viewport::Bounds {
            bounds: second[0].bounding_box().unwrap()
        }
    );
}

#[tokio::test]
async fn late_failure_of_superseded_route_keeps_newer_overlays() {
    let (slow, gate) = Reply::gated(Err(ProviderError::Status(502)));
    let h = Harness::located(vec![], vec![slow, Reply::ready(Ok(osrm(TWO_ROUTES)))]).await;

    let router = h.router.clone();
    let first =
        tokio::spawn(async move { router.route(pos(12.9, 77.6), pos(12.95, 77.58)).await });
    gate.started.await.unwrap();

    h.router
        .route(pos(12.9, 77.6), pos(12.91, 77.61))
        .await
        .unwrap();
    gate.release.send(()).unwrap();

    assert_eq!(first.await.unwrap(), Err(RescuemapError::Superseded));
    assert_eq!(h.map.read().await.route_count(), 2);
}

#[tokio::test]
async fn call_needs_a_phone_number() {
    let h = Harness::located(vec![Reply::ready(Ok(overpass(TWO_POLICE)))], vec![]).await;
    let set = h.controller.search(FacilityCategory::Police).await.unwrap();

    let no_phone = h
        .controller
        .choose(pick(set.generation, 1, SelectionAction::Call))
        .await;
    assert_eq!(no_phone, Err(RescuemapError::NoPhone));
    assert!(h.controller.pending_choices().await.is_some());

    let outcome = h
        .controller
        .choose(pick(set.generation, 0, SelectionAction::Call))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SelectionOutcome::CallPlaced {
            number: "100".to_string(),
            link: DeepLink {
                kind: DeepLinkKind::Call,
                url: "tel:100".to_string(),
            },
        }
    );

    let reused = h
        .controller
        .choose(pick(set.generation, 0, SelectionAction::Call))
        .await;
    assert_eq!(reused, Err(RescuemapError::NoSelection));
}

#[tokio::test]
async fn video_call_uses_phone_digits() {
    let h = Harness::located(vec![Reply::ready(Ok(overpass(THREE_HOSPITALS)))], vec![]).await;
    let set = h.controller.search(FacilityCategory::Hospital).await.unwrap();

    let outcome = h
        .controller
        .choose(pick(set.generation, 0, SelectionAction::VideoCall))
        .await
        .unwrap();

    let SelectionOutcome::VideoCallPlaced { number, link } = outcome else {
        panic!("expected a video call outcome");
    };
    assert_eq!(number, "918022223333");
    assert_eq!(link.kind, DeepLinkKind::VideoCall);
    assert_eq!(link.url, "https://wa.me/918022223333?call&video=true");
}

#[tokio::test]
async fn selection_from_superseded_set_is_rejected() {
    let h = Harness::located(
        vec![
            Reply::ready(Ok(overpass(THREE_HOSPITALS))),
            Reply::ready(Ok(overpass(TWO_POLICE))),
        ],
        vec![],
    )
    .await;
    let old = h.controller.search(FacilityCategory::Hospital).await.unwrap();
    let new = h.controller.search(FacilityCategory::Police).await.unwrap();

    let result = h
        .controller
        .choose(pick(old.generation, 0, SelectionAction::Navigate))
        .await;

    assert_eq!(
        result,
        Err(RescuemapError::StaleSelection {
            requested: old.generation.0,
            current: new.generation.0,
        })
    );
    assert_eq!(h.routes.calls(), 0);
}

#[tokio::test]
async fn cancel_discards_choices() {
    let h = Harness::located(vec![Reply::ready(Ok(overpass(TWO_POLICE)))], vec![]).await;
    let set = h.controller.search(FacilityCategory::Police).await.unwrap();

    let outcome = h
        .controller
        .choose(Selection {
            generation: set.generation,
            choice: None,
            action: SelectionAction::Cancel,
        })
        .await
        .unwrap();

    assert_eq!(outcome, SelectionOutcome::Cancelled);
    assert!(h.controller.pending_choices().await.is_none());
}

#[tokio::test]
async fn sos_messages_contacts_then_calls_first() {
    let h = Harness::located(vec![], vec![]).await;

    let receipt = h.controller.sos().unwrap();

    assert_eq!(receipt.alert.contacts, vec!["+1A", "+1B"]);
    let links = receipt.links;
    assert_eq!(links.len(), 3);
    for link in &links[..2] {
        assert_eq!(link.kind, DeepLinkKind::Message);
        assert!(link.url.contains("12.9"));
        assert!(link.url.contains("77.6"));
    }
    assert_eq!(links[2].kind, DeepLinkKind::Call);
    assert_eq!(links[2].url, "tel:+1A");
}

#[tokio::test]
async fn sos_without_fix_is_rejected() {
    let h = Harness::new(vec![], vec![]);

    assert_eq!(h.controller.sos(), Err(RescuemapError::PositionUnavailable));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simultaneous_sos_and_call_keep_their_own_links() {
    let h = Harness::located(vec![Reply::ready(Ok(overpass(TWO_POLICE)))], vec![]).await;
    let set = h.controller.search(FacilityCategory::Police).await.unwrap();

    let controller = h.controller.clone();
    let sos = tokio::spawn(async move { controller.sos() });
    let call = h
        .controller
        .choose(pick(set.generation, 0, SelectionAction::Call))
        .await
        .unwrap();
    let receipt = sos.await.unwrap().unwrap();

    let SelectionOutcome::CallPlaced { link, .. } = call else {
        panic!("expected a call outcome");
    };
    assert_eq!(link.url, "tel:100");

    let urls: Vec<_> = receipt.links.iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls.len(), 3);
    assert!(!urls.contains(&"tel:100"));
    assert_eq!(urls[2], "tel:+1A");
}
