//! End-to-end scenarios through the public `MediaRelay` API
//!
//! Everything runs in-process: a fake extractor writes the bytes and a
//! collecting channel stands in for the chat platform.

mod common;

use common::{
    CollectingChannel, FakeExtractor, part_files, poll_until_terminal, relay, tiny_limits,
};
use media_relay::delivery::{ChannelSet, DeliveryChannel, DeliveryTarget};
use media_relay::{DeliveryOption, DeliveryOutcome, JobStatus};
use std::sync::Arc;

fn target() -> DeliveryTarget {
    DeliveryTarget {
        chat_id: "42".into(),
    }
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_completed() {
    let dir = tempfile::tempdir().unwrap();
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::writing(vec![1; 100]),
        ChannelSet::none(),
    )
    .await;

    let id = relay
        .submit("https://example.com/watch?v=1", None)
        .await
        .unwrap();
    let seen = poll_until_terminal(&relay, &id).await;

    assert!(
        seen.windows(2)
            .all(|w| w[0].downloaded_bytes <= w[1].downloaded_bytes),
        "downloaded_bytes went backwards"
    );
    assert!(seen.iter().all(|s| (0.0..=100.0).contains(&s.percentage)));
    let last = seen.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.percentage, 100.0);
    assert_eq!(last.filesize, 100);
}

#[tokio::test]
async fn cancelled_job_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::holding(),
        ChannelSet::none(),
    )
    .await;

    let id = relay.submit("https://example.com/v", None).await.unwrap();
    assert!(relay.cancel(&id));
    let seen = poll_until_terminal(&relay, &id).await;

    assert_eq!(seen.last().unwrap().status, JobStatus::Cancelled);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(id.as_str()))
        .collect();
    assert!(leftovers.is_empty(), "files left behind: {leftovers:?}");
}

#[tokio::test]
async fn oversized_file_without_large_channel_is_link_only() {
    let dir = tempfile::tempdir().unwrap();
    let direct = Arc::new(CollectingChannel::default());
    // 2.5 x small_limit
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::writing(vec![3; 25]),
        ChannelSet::new(Some(direct.clone() as Arc<dyn DeliveryChannel>), None),
    )
    .await;
    let id = relay.submit("https://example.com/v", None).await.unwrap();
    poll_until_terminal(&relay, &id).await;

    let decision = relay.delivery_options(&id).await.unwrap();

    assert_eq!(decision.options, vec![DeliveryOption::Link]);
    assert!(
        decision
            .rejection_for(DeliveryOption::LargePayload)
            .unwrap()
            .starts_with("channel unavailable")
    );
    assert!(part_files(dir.path()).is_empty());
    assert!(direct.uploads().is_empty());
}

#[tokio::test]
async fn split_upload_sends_parts_in_order_and_removes_each() {
    let dir = tempfile::tempdir().unwrap();
    let large = Arc::new(CollectingChannel::default());
    let payload: Vec<u8> = (0..105u8).collect();
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::writing(payload.clone()),
        ChannelSet::new(None, Some(large.clone() as Arc<dyn DeliveryChannel>)),
    )
    .await;
    let id = relay.submit("https://example.com/v", None).await.unwrap();
    poll_until_terminal(&relay, &id).await;

    let decision = relay.delivery_options(&id).await.unwrap();
    assert_eq!(
        decision.options,
        vec![DeliveryOption::SplitUpload, DeliveryOption::Link]
    );

    let outcome = relay
        .deliver(&id, DeliveryOption::SplitUpload, target(), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        DeliveryOutcome::Delivered {
            option: DeliveryOption::SplitUpload,
            parts: 3,
            size: 105,
            ..
        }
    ));

    let uploads = large.uploads();
    let sizes: Vec<usize> = uploads.iter().map(|u| u.bytes.len()).collect();
    assert_eq!(sizes, vec![40, 40, 25]);
    for (i, upload) in uploads.iter().enumerate() {
        assert!(upload.file_name.ends_with(&format!(".part{:03}.mp4", i + 1)));
        // only the part being uploaded exists; earlier ones are already gone
        assert_eq!(upload.parts_on_disk.len(), 1, "{:?}", upload.parts_on_disk);
    }
    let joined: Vec<u8> = uploads.iter().flat_map(|u| u.bytes.clone()).collect();
    assert_eq!(joined, payload);
    assert!(part_files(dir.path()).is_empty());
}

#[tokio::test]
async fn link_delivery_points_at_file_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::writing(vec![1; 5]),
        ChannelSet::none(),
    )
    .await;
    let id = relay.submit("https://example.com/v", None).await.unwrap();
    poll_until_terminal(&relay, &id).await;

    let outcome = relay
        .deliver(&id, DeliveryOption::Link, target(), None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DeliveryOutcome::Link {
            url: format!("https://relay.example/api/download-file/{id}")
        }
    );
}

#[tokio::test]
async fn shutdown_rejects_new_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let relay = relay(
        tiny_limits(dir.path()),
        FakeExtractor::holding(),
        ChannelSet::none(),
    )
    .await;
    let running = relay.submit("https://example.com/v", None).await.unwrap();

    relay.shutdown().await.unwrap();

    assert_eq!(relay.progress(&running).status, JobStatus::Cancelled);
    assert!(matches!(
        relay.submit("https://example.com/other", None).await,
        Err(media_relay::Error::ShuttingDown)
    ));
    assert!(relay.shutdown_token().is_cancelled());
}
