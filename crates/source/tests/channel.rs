#![forbid(unsafe_code)]

use std::sync::Arc;

use cfgsrc_core::EventKind;
use cfgsrc_decode::DecodeLimits;
use cfgsrc_schema::builtin;
use cfgsrc_source::{channel, KubeSource};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_handler_streams_events_to_a_task() {
    let (handler, mut rx) = channel();
    let s = Arc::new(KubeSource::with_limits(builtin::basic(), DecodeLimits::default()));
    s.dispatch(Arc::new(handler));
    s.start();

    let consumer = tokio::spawn(async move {
        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(ev.kind());
            if ev.kind() == EventKind::Deleted {
                break;
            }
        }
        kinds
    });

    let doc = "apiVersion: testdata.cfgsrc.io/v1alpha1\nkind: Kind1\nmetadata:\n  name: a\n  namespace: ns\nspec: {}\n";
    s.apply_content("foo", doc).expect("apply");
    s.remove_content("foo");

    let kinds = tokio::time::timeout(std::time::Duration::from_secs(5), consumer)
        .await
        .expect("consumer finished")
        .expect("consumer task");
    assert_eq!(kinds, vec![EventKind::FullSync, EventKind::Added, EventKind::Deleted]);
}

#[test]
fn dropped_receiver_does_not_break_the_source() {
    let (handler, rx) = channel();
    drop(rx);
    let s = KubeSource::with_limits(builtin::basic(), DecodeLimits::default());
    s.dispatch(Arc::new(handler));
    s.start();
    let doc = "apiVersion: testdata.cfgsrc.io/v1alpha1\nkind: Kind1\nmetadata:\n  name: a\nspec: {}\n";
    s.apply_content("foo", doc).expect("apply");
    assert_eq!(s.get(builtin::COLLECTION1).all_sorted().len(), 1);
}
