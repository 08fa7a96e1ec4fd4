#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::client::MockCatalogGateway;
    use crate::error::RecommendError;
    use crate::models::{AudioFeatures, Track};
    use crate::store::FeatureStore;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Similarity provider with canned neighbours
    struct FixedSimilarity(Vec<String>);

    impl SimilarityProvider for FixedSimilarity {
        fn similar_items(&self, track_id: &str, count: usize) -> Vec<String> {
            self.0
                .iter()
                .filter(|id| id.as_str() != track_id)
                .take(count)
                .cloned()
                .collect()
        }
    }

    fn create_mock_track(id: &str, name: &str, artist: &str) -> Track {
        Track {
            track_id: id.to_string(),
            track_name: name.to_string(),
            artist_name: artist.to_string(),
            album_name: format!("{name} (Single)"),
            release_date: "2018".to_string(),
            popularity: 60,
        }
    }

    fn create_mock_features(id: &str, i: usize) -> AudioFeatures {
        let x = i as f64;
        AudioFeatures {
            track_id: id.to_string(),
            danceability: Some(0.2 + 0.05 * x),
            energy: Some(0.9 - 0.06 * x),
            key: Some((i % 12) as i32),
            loudness: Some(-4.0 - x),
            mode: Some((i % 2) as i32),
            speechiness: Some(0.05),
            acousticness: Some(0.1 + 0.07 * x),
            instrumentalness: Some(0.0),
            liveness: Some(0.1),
            valence: Some(0.3 + 0.04 * x),
            tempo: Some(90.0 + 7.0 * x * x),
        }
    }

    /// A store holding `n` joined tracks "t0".."t{n-1}" named "Song i" by "Artist i"
    fn create_test_store(n: usize) -> (TempDir, FeatureStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FeatureStore::open(dir.path()).unwrap();
        let tracks: Vec<_> = (0..n)
            .map(|i| create_mock_track(&format!("t{i}"), &format!("Song {i}"), &format!("Artist {i}")))
            .collect();
        let features: Vec<_> = (0..n)
            .map(|i| create_mock_features(&format!("t{i}"), i))
            .collect();
        store.append_tracks(&tracks).unwrap();
        store.append_audio_features(&features).unwrap();
        store.clean_and_join().unwrap();
        (dir, store)
    }

    fn create_test_config() -> EngineConfig {
        EngineConfig {
            interaction_seed: Some(7),
            sampling_seed: Some(13),
            ..Default::default()
        }
    }

    /// A gateway where every call fails; recommendations degrade to empty at the gateway boundary
    fn create_failing_gateway() -> MockCatalogGateway {
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_fetch_metadata()
            .returning(|_| Err(RecommendError::ExternalService("down".to_string())));
        gateway
            .expect_fetch_audio_features()
            .returning(|_| Err(RecommendError::ExternalService("down".to_string())));
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());
        gateway
            .expect_search_track_by_name()
            .returning(|_| Err(RecommendError::ExternalService("down".to_string())));
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Err(RecommendError::ExternalService("down".to_string())));
        gateway
            .expect_top_tracks_of_artist()
            .returning(|_| Err(RecommendError::ExternalService("down".to_string())));
        gateway
    }

    fn found_tracks(outcome: &RecommendationOutcome) -> &[RecommendedTrack] {
        match outcome {
            RecommendationOutcome::Found { tracks, .. } => tracks,
            RecommendationOutcome::Unavailable { .. } => panic!("expected recommendations, got none"),
        }
    }

    #[test]
    fn test_local_signals_survive_gateway_outage() {
        let (_dir, store) = create_test_store(12);
        let mut engine =
            HybridEngine::new(create_test_config(), store, Box::new(create_failing_gateway()));

        let outcome = engine.hybrid_recommendation("t3");
        let tracks = found_tracks(&outcome);

        assert!(!tracks.is_empty());
        assert!(tracks.iter().all(|t| t.source != SignalSource::External));
        assert!(
            tracks.iter().any(|t| t.source == SignalSource::Collaborative),
            "Collaborative neighbours should be present: {tracks:?}"
        );
    }

    #[test]
    fn test_unavailable_only_when_every_signal_is_empty() {
        let (_dir, store) = create_test_store(1);
        let mut engine =
            HybridEngine::new(create_test_config(), store, Box::new(create_failing_gateway()));

        let outcome = engine.hybrid_recommendation("t0");
        assert_eq!(outcome, RecommendationOutcome::Unavailable { seed_note: None });
        assert_eq!(outcome.to_string(), "No recommendations available.");
    }

    #[test]
    fn test_unknown_track_with_failing_gateway_degrades() {
        let (_dir, store) = create_test_store(6);
        let mut engine =
            HybridEngine::new(create_test_config(), store, Box::new(create_failing_gateway()));

        assert_eq!(
            engine.hybrid_recommendation("not-in-store"),
            RecommendationOutcome::Unavailable { seed_note: None }
        );
    }

    #[test]
    fn test_never_recommends_the_query_track() {
        let (_dir, store) = create_test_store(12);
        let config = EngineConfig {
            max_clusters: 2,
            ..create_test_config()
        };
        let mut engine = HybridEngine::new(config, store, Box::new(create_failing_gateway()));

        for _ in 0..5 {
            let outcome = engine.hybrid_recommendation("t5");
            assert!(found_tracks(&outcome).iter().all(|t| t.track_name != "Song 5"));
        }
    }

    #[test]
    fn test_merged_set_has_no_duplicate_pairs() {
        let (_dir, store) = create_test_store(4);
        let config = EngineConfig {
            max_clusters: 1,
            ..create_test_config()
        };

        let mut gateway = MockCatalogGateway::new();
        gateway.expect_fetch_recommendations().returning(|_, _| {
            vec![
                create_mock_track("t1", "Song 1", "Artist 1"),
                create_mock_track("t2", "Song 2", "Artist 2"),
            ]
        });
        gateway.expect_fetch_metadata().never();
        gateway.expect_fetch_audio_features().never();

        let similarity = FixedSimilarity(vec!["t1".to_string(), "t3".to_string()]);
        let mut engine =
            HybridEngine::with_similarity(config, store, Box::new(gateway), Box::new(similarity));

        let outcome = engine.hybrid_recommendation("t0");
        let tracks = found_tracks(&outcome);

        let pairs: HashSet<_> = tracks
            .iter()
            .map(|t| (t.track_name.clone(), t.artist_name.clone()))
            .collect();
        assert_eq!(pairs.len(), tracks.len());
        // t1, t2, t3 are all cluster peers and win over the later sources
        assert_eq!(tracks.len(), 3);
        assert!(tracks.iter().all(|t| t.source == SignalSource::Cluster));
    }

    #[test]
    fn test_small_merged_set_is_returned_whole() {
        let (_dir, store) = create_test_store(4);
        let config = EngineConfig {
            n_cluster_recs: 3,
            n_collab_recs: 3,
            n_external_recs: 3,
            max_clusters: 1,
            ..create_test_config()
        };

        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_fetch_recommendations()
            .withf(|seeds, limit| seeds.tracks == ["t0".to_string()] && *limit == 3)
            .returning(|_, _| {
                vec![
                    create_mock_track("e1", "Elsewhere", "Stranger"),
                    create_mock_track("e2", "Faraway", "Stranger"),
                ]
            });
        gateway
            .expect_fetch_audio_features()
            .times(1)
            .returning(|ids| {
                Ok(ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| create_mock_features(id, i + 20))
                    .collect())
            });

        let similarity = FixedSimilarity(vec!["t2".to_string()]);
        let mut engine =
            HybridEngine::with_similarity(config, store, Box::new(gateway), Box::new(similarity));

        let outcome = engine.hybrid_recommendation("t0");
        let tracks = found_tracks(&outcome);

        // 3 cluster peers + 2 external tracks; the collaborative pick duplicates a peer
        assert_eq!(tracks.len(), 5);
        let names: HashSet<_> = tracks.iter().map(|t| t.track_name.as_str()).collect();
        for name in ["Song 1", "Song 2", "Song 3", "Elsewhere", "Faraway"] {
            assert!(names.contains(name), "missing {name}");
        }

        // External recommendations enrich the store
        assert!(engine.store().lookup("e1").is_some());
        assert!(engine.store().lookup("e2").is_some());
    }

    #[test]
    fn test_every_distinct_candidate_fits_under_the_total() {
        let (_dir, store) = create_test_store(20);
        let config = EngineConfig {
            n_cluster_recs: 19,
            n_collab_recs: 10,
            n_external_recs: 0,
            max_clusters: 1,
            ..create_test_config()
        };
        let mut engine = HybridEngine::new(config, store, Box::new(create_failing_gateway()));

        // All 19 other tracks share the cluster; the collaborative picks are among them
        let outcome = engine.hybrid_recommendation("t0");
        assert_eq!(found_tracks(&outcome).len(), 19);
    }

    #[test]
    fn test_oversized_merged_set_is_sampled_down() {
        let (_dir, store) = create_test_store(4);
        let config = EngineConfig {
            n_cluster_recs: 1,
            n_collab_recs: 0,
            n_external_recs: 1,
            max_clusters: 1,
            ..create_test_config()
        };

        // A catalog that ignores the requested limit
        let mut gateway = MockCatalogGateway::new();
        gateway.expect_fetch_recommendations().returning(|_, _| {
            (1..=4)
                .map(|i| create_mock_track(&format!("e{i}"), &format!("Extra {i}"), "Stranger"))
                .collect()
        });
        gateway
            .expect_fetch_audio_features()
            .returning(|ids| Ok(ids.iter().map(|id| create_mock_features(id, 9)).collect()));

        let similarity = FixedSimilarity(Vec::new());
        let mut engine =
            HybridEngine::with_similarity(config, store, Box::new(gateway), Box::new(similarity));

        let outcome = engine.hybrid_recommendation("t0");
        let tracks = found_tracks(&outcome);
        assert_eq!(tracks.len(), 2);
        let pairs: HashSet<_> = tracks.iter().map(|t| t.track_name.as_str()).collect();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_unknown_query_track_is_added_and_clustered() {
        let (_dir, store) = create_test_store(8);

        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_fetch_metadata()
            .times(1)
            .returning(|id| Ok(create_mock_track(id, "Newcomer", "Debut Artist")));
        gateway
            .expect_fetch_audio_features()
            .times(1)
            .returning(|ids| Ok(ids.iter().map(|id| create_mock_features(id, 3)).collect()));
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        assert!(engine.clusters().unwrap().label_of("fresh").is_none());

        let outcome = engine.hybrid_recommendation("fresh");

        assert!(engine.store().lookup("fresh").is_some());
        assert!(engine.clusters().unwrap().label_of("fresh").is_some());
        assert!(found_tracks(&outcome).iter().all(|t| t.track_name != "Newcomer"));
    }

    #[test]
    fn test_track_query_not_found() {
        let (_dir, store) = create_test_store(3);
        let mut gateway = MockCatalogGateway::new();
        gateway.expect_search_track_by_name().returning(|_| Ok(None));

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let result = engine.recommend("No Such Song", QueryKind::Track);

        match result {
            Err(RecommendError::NotFound(message)) => {
                assert_eq!(message, "Track not found on Spotify.")
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_track_query_resolves_by_name() {
        let (_dir, store) = create_test_store(12);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_track_by_name()
            .withf(|name| name == "Song 4")
            .returning(|_| Ok(Some("t4".to_string())));
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());
        gateway.expect_fetch_metadata().never();

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let outcome = engine.recommend("Song 4", QueryKind::Track).unwrap();

        assert!(!found_tracks(&outcome).is_empty());
    }

    #[test]
    fn test_artist_query_with_known_top_track_skips_enrichment() {
        let (_dir, store) = create_test_store(12);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("artist-2".to_string())));
        gateway
            .expect_top_tracks_of_artist()
            .withf(|id| id == "artist-2")
            .returning(|_| {
                Ok(vec![
                    create_mock_track("t2", "Song 2", "Artist 2"),
                    create_mock_track("x9", "Deep Cut", "Artist 2"),
                ])
            });
        gateway.expect_fetch_metadata().never();
        gateway.expect_fetch_audio_features().never();
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let outcome = engine.recommend("Artist 2", QueryKind::Artist).unwrap();

        match &outcome {
            RecommendationOutcome::Found { seed_note, tracks } => {
                assert_eq!(
                    seed_note.as_deref(),
                    Some("Using top track 'Song 2' by Artist 2 for recommendations.")
                );
                assert!(!tracks.is_empty());
            }
            RecommendationOutcome::Unavailable { .. } => panic!("expected recommendations"),
        }
        assert!(engine.store().lookup("x9").is_none());
    }

    #[test]
    fn test_artist_query_files_new_track_under_searched_name() {
        let (_dir, store) = create_test_store(6);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("a1".to_string())));
        gateway.expect_top_tracks_of_artist().returning(|_| {
            Ok(vec![
                create_mock_track("top1", "Hit", "Official Name"),
                create_mock_track("top2", "B-Side", "Official Name"),
            ])
        });
        gateway.expect_fetch_metadata().never();
        gateway
            .expect_fetch_audio_features()
            .withf(|ids| ids == ["top1".to_string()])
            .times(1)
            .returning(|ids| Ok(ids.iter().map(|id| create_mock_features(id, 2)).collect()));
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        engine.recommend("typed name", QueryKind::Artist).unwrap();

        assert_eq!(engine.store().lookup("top1").unwrap().artist_name, "typed name");
        assert!(engine.store().lookup("top2").is_none());
    }

    #[test]
    fn test_artist_query_can_enrich_all_top_tracks() {
        let (_dir, store) = create_test_store(6);
        let config = EngineConfig {
            enrich_all_top_tracks: true,
            ..create_test_config()
        };
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("a1".to_string())));
        gateway.expect_top_tracks_of_artist().returning(|_| {
            Ok(vec![
                create_mock_track("top1", "Hit", "Official Name"),
                create_mock_track("top2", "B-Side", "Official Name"),
            ])
        });
        gateway
            .expect_fetch_audio_features()
            .times(1)
            .returning(|ids| {
                Ok(ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| create_mock_features(id, i + 1))
                    .collect())
            });
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(config, store, Box::new(gateway));
        engine.recommend("typed name", QueryKind::Artist).unwrap();

        assert_eq!(engine.store().lookup("top1").unwrap().artist_name, "typed name");
        assert_eq!(engine.store().lookup("top2").unwrap().artist_name, "Official Name");
    }

    #[test]
    fn test_artist_without_top_tracks_is_not_found() {
        let (_dir, store) = create_test_store(3);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("a1".to_string())));
        gateway.expect_top_tracks_of_artist().returning(|_| Ok(Vec::new()));

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let result = engine.recommend("Silent Artist", QueryKind::Artist);

        assert!(matches!(result, Err(RecommendError::NotFound(_))));
    }

    #[test]
    fn test_seed_genres_ride_along_with_track_seed() {
        let (_dir, store) = create_test_store(3);
        let config = EngineConfig {
            seed_genres: vec!["j-pop".to_string()],
            ..create_test_config()
        };
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_fetch_recommendations()
            .withf(|seeds, _| seeds.tracks == ["t1".to_string()] && seeds.genres == ["j-pop".to_string()])
            .times(1)
            .returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(config, store, Box::new(gateway));
        engine.hybrid_recommendation("t1");
    }

    #[test]
    fn test_search_outage_is_reported_as_a_message() {
        let (_dir, store) = create_test_store(3);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_track_by_name()
            .returning(|_| Err(RecommendError::ExternalService("HTTP 503".to_string())));
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Err(RecommendError::ExternalService("HTTP 503".to_string())));

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));

        match engine.recommend("Plastic Love", QueryKind::Track) {
            Err(RecommendError::NotFound(message)) => {
                assert!(message.starts_with("Error fetching track ID"), "{message}");
                assert!(message.contains("HTTP 503"));
            }
            other => panic!("expected a user-facing message, got {other:?}"),
        }
        match engine.recommend("Mariya Takeuchi", QueryKind::Artist) {
            Err(RecommendError::NotFound(message)) => {
                assert!(message.starts_with("Error fetching artist ID"), "{message}")
            }
            other => panic!("expected a user-facing message, got {other:?}"),
        }
    }

    #[test]
    fn test_top_tracks_outage_is_reported_as_a_message() {
        let (_dir, store) = create_test_store(3);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("a1".to_string())));
        gateway
            .expect_top_tracks_of_artist()
            .returning(|_| Err(RecommendError::ExternalService("timed out".to_string())));

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let result = engine.recommend("Someone", QueryKind::Artist);

        assert!(
            matches!(&result, Err(RecommendError::NotFound(message)) if message.starts_with("Error fetching top tracks")),
            "{result:?}"
        );
    }

    #[test]
    fn test_artist_note_is_kept_without_recommendations() {
        let (_dir, store) = create_test_store(0);
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_search_artist_by_name()
            .returning(|_| Ok(Some("a1".to_string())));
        gateway
            .expect_top_tracks_of_artist()
            .returning(|_| Ok(vec![create_mock_track("solo", "Hit", "Official Name")]));
        gateway
            .expect_fetch_audio_features()
            .returning(|ids| Ok(ids.iter().map(|id| create_mock_features(id, 1)).collect()));
        gateway.expect_fetch_recommendations().returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(create_test_config(), store, Box::new(gateway));
        let outcome = engine.recommend("Lonely", QueryKind::Artist).unwrap();

        assert_eq!(
            outcome,
            RecommendationOutcome::Unavailable {
                seed_note: Some("Using top track 'Hit' by Lonely for recommendations.".to_string())
            }
        );
        assert_eq!(
            outcome.to_string(),
            "Using top track 'Hit' by Lonely for recommendations.\n\nNo recommendations available."
        );
    }

    #[test]
    fn test_external_limit_is_capped() {
        let (_dir, store) = create_test_store(3);
        let config = EngineConfig {
            n_external_recs: 500,
            ..create_test_config()
        };
        let mut gateway = MockCatalogGateway::new();
        gateway
            .expect_fetch_recommendations()
            .withf(|_, limit| *limit == 100)
            .times(1)
            .returning(|_, _| Vec::new());

        let mut engine = HybridEngine::new(config, store, Box::new(gateway));
        engine.hybrid_recommendation("t0");
    }

    #[test]
    fn test_outcome_serializes_with_status() {
        let found = RecommendationOutcome::Found {
            seed_note: None,
            tracks: vec![RecommendedTrack::new("Song 1", "Artist 1", SignalSource::Cluster)],
        };
        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["status"], "found");
        assert_eq!(json["tracks"][0]["track_name"], "Song 1");
        assert_eq!(json["tracks"][0]["source"], "cluster");

        let unavailable = RecommendationOutcome::Unavailable { seed_note: None };
        assert_eq!(
            serde_json::to_value(&unavailable).unwrap(),
            serde_json::json!({"status": "unavailable", "seed_note": null})
        );
    }
}
