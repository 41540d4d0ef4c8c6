use std::sync::Arc;

use cardlink_core::{
  ErrorKind,
  engagement::EngagementTracker,
  event::{EventKind, RequestMeta},
  identity::{IdentityLinker, LinkRequest, SignedAssertionVerifier},
  slug::SlugRegistry,
  store::ProfileStore as _,
  token::{SessionTokens, Signer},
};
use chrono::Utc;
use tokio::task::JoinSet;

use super::{account_id, store};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_views_are_all_counted() {
  const N: u64 = 50;

  let s = store().await;
  let id = account_id(&s, "Jane Doe").await;
  let tracker = EngagementTracker::new(Arc::clone(&s));

  let mut set = JoinSet::new();
  for _ in 0..N {
    let tracker = tracker.clone();
    set.spawn(async move {
      tracker.record_view(id, None, None, RequestMeta::default()).await
    });
  }
  while let Some(joined) = set.join_next().await {
    joined.unwrap().unwrap();
  }

  let account = s.get_account(id).await.unwrap().unwrap();
  assert_eq!(account.total_views, N);
  assert_eq!(s.count_events(id, EventKind::View).await.unwrap(), N);
  assert_eq!(
    s.get_global_aggregate().await.unwrap().unwrap().total_profile_views,
    N
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_links_of_one_identity_succeed_once() {
  const N: usize = 8;

  let s = store().await;
  let verifier = Arc::new(SignedAssertionVerifier::new(
    Signer::new(vec![7u8; 32]).unwrap(),
  ));
  let tokens = SessionTokens::new(Signer::new(vec![9u8; 32]).unwrap());
  let linker = IdentityLinker::new(Arc::clone(&s), Arc::clone(&verifier), tokens);
  let registry = SlugRegistry::new(Arc::clone(&s), "https://cards.example.com");

  let mut requests = Vec::new();
  for i in 0..N {
    let id = account_id(&s, &format!("Person {i}")).await;
    let slug = registry.register(id).await.unwrap().slug;
    requests.push(LinkRequest {
      account_id: id,
      slug,
      external_id: "g-shared".into(),
      email: "shared@gmail.example".into(),
      proof: verifier.mint("g-shared", None, Utc::now()).unwrap(),
    });
  }

  let mut set = JoinSet::new();
  for req in requests {
    let linker = linker.clone();
    set.spawn(async move { linker.link(req).await });
  }

  let mut linked = 0;
  while let Some(joined) = set.join_next().await {
    match joined.unwrap() {
      Ok(result) => {
        assert!(result.linked);
        linked += 1;
      }
      Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
    }
  }
  assert_eq!(linked, 1);

  let holder = s.find_account_by_external_id("g-shared").await.unwrap().unwrap();
  let mapping = s.get_identity_mapping("g-shared").await.unwrap().unwrap();
  assert_eq!(mapping.account_id, holder.account_id);

  let bound = s
    .list_accounts()
    .await
    .unwrap()
    .into_iter()
    .filter(|a| a.google_uid.is_some())
    .count();
  assert_eq!(bound, 1);
}
