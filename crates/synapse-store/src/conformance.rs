//! Behavior every backend must share, run against each one from its tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use synapse_core::{Allowances, CreditError, CreditLedger, CreditType, User};

use crate::{OnMissing, Store, StoreError};

// Millisecond precision survives every backend's timestamp encoding.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn user(name: &str) -> User {
    User::new(name, format!("{name}@example.com"), now())
}

fn seed(user: &User) -> CreditLedger {
    CreditLedger::new(user.id, Allowances::default(), now())
}

pub async fn user_lifecycle(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();

    assert_eq!(store.get_user(&ada.id).await.unwrap().unwrap(), ada);
    assert_eq!(
        store
            .get_user_by_email("ADA@example.com")
            .await
            .unwrap()
            .unwrap()
            .id,
        ada.id
    );
    assert!(store.get_user_by_email("bob@example.com").await.unwrap().is_none());

    let until = now() + Duration::days(30);
    let updated = store
        .update_user(&ada.id, &|u| {
            u.is_premium = true;
            u.premium_expires_at = Some(until);
            u.email = "hijack@example.com".into();
        })
        .await
        .unwrap();
    assert!(updated.is_premium);
    assert_eq!(updated.email, ada.email);

    let missing = store.update_user(&user("ghost").id, &|_| {}).await;
    assert!(matches!(missing, Err(StoreError::NotFound { entity: "user", .. })));
}

pub async fn duplicate_users_rejected(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();

    let mut same_email = user("ada2");
    same_email.email = ada.email.clone();
    assert!(matches!(
        store.create_user(&same_email).await,
        Err(StoreError::Duplicate { field: "email", .. })
    ));

    let mut same_name = user("other");
    same_name.username = ada.username.clone();
    assert!(matches!(
        store.create_user(&same_name).await,
        Err(StoreError::Duplicate { field: "username", .. })
    ));
}

pub async fn ledger_created_once(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();

    let consume = |l: &mut CreditLedger| l.consume(CreditType::Chat);

    let first = store
        .update_ledger(&ada.id, OnMissing::Create(seed(&ada)), &consume)
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(first.ledger.chat_allowance, 9);

    let second = store
        .update_ledger(&ada.id, OnMissing::Create(seed(&ada)), &consume)
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.ledger.chat_allowance, 8);

    assert!(!store.insert_ledger(&seed(&ada)).await.unwrap());
    assert_eq!(
        store.get_ledger(&ada.id).await.unwrap().unwrap().chat_allowance,
        8
    );
}

pub async fn rejected_mutation_still_commits(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();
    let mut empty = seed(&ada);
    empty.image_allowance = 0;
    store.insert_ledger(&empty).await.unwrap();

    let watermark = now() + Duration::minutes(5);
    let update = store
        .update_ledger(&ada.id, OnMissing::Fail, &|l| {
            l.last_reset_at = watermark;
            l.consume(CreditType::Image)
        })
        .await
        .unwrap();

    assert_eq!(
        update.rejected,
        Some(CreditError::InsufficientCredit {
            credit_type: CreditType::Image
        })
    );
    let stored = store.get_ledger(&ada.id).await.unwrap().unwrap();
    assert_eq!(stored.image_allowance, 0);
    assert_eq!(stored.last_reset_at, watermark);
}

pub async fn missing_ledger_policies(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();

    let result = store
        .update_ledger(&ada.id, OnMissing::Fail, &|_| Ok(()))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { entity: "ledger", .. })));

    let ghost = user("ghost");
    let result = store
        .update_ledger(&ghost.id, OnMissing::Create(seed(&ghost)), &|_| Ok(()))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { entity: "user", .. })));
    assert!(matches!(
        store.insert_ledger(&seed(&ghost)).await,
        Err(StoreError::NotFound { entity: "user", .. })
    ));
}

pub async fn delete_cascades_to_ledger(store: &dyn Store) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();
    store.insert_ledger(&seed(&ada)).await.unwrap();

    store.delete_user(&ada.id).await.unwrap();

    assert!(store.get_user(&ada.id).await.unwrap().is_none());
    assert!(store.get_ledger(&ada.id).await.unwrap().is_none());
    assert!(store.get_user_by_email(&ada.email).await.unwrap().is_none());
    assert!(matches!(
        store.delete_user(&ada.id).await,
        Err(StoreError::NotFound { .. })
    ));
}

pub async fn stripe_customer_link(store: &dyn Store) {
    let ada = user("ada");
    let bob = user("bob");
    store.create_user(&ada).await.unwrap();
    store.create_user(&bob).await.unwrap();

    store
        .update_user(&ada.id, &|u| u.stripe_customer_id = Some("cus_123".into()))
        .await
        .unwrap();
    let found = store.get_user_by_stripe_customer("cus_123").await.unwrap();
    assert_eq!(found.unwrap().id, ada.id);

    let clash = store
        .update_user(&bob.id, &|u| u.stripe_customer_id = Some("cus_123".into()))
        .await;
    assert!(matches!(clash, Err(StoreError::Duplicate { .. })));
}

pub async fn concurrent_deductions_never_overdraw<S: Store + 'static>(store: Arc<S>) {
    let ada = user("ada");
    store.create_user(&ada).await.unwrap();
    let mut last_one = seed(&ada);
    last_one.chat_allowance = 1;
    store.insert_ledger(&last_one).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = ada.id;
            tokio::spawn(async move {
                store
                    .update_ledger(&id, OnMissing::Fail, &|l| l.consume(CreditType::Chat))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        let update = task.await.unwrap();
        if update.rejected.is_none() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(
        store.get_ledger(&ada.id).await.unwrap().unwrap().chat_allowance,
        0
    );
}
