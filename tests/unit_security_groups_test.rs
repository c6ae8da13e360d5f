use flintrock::core::provider::memory::MemoryProvider;
use flintrock::core::provider::{ComputeProvider, Protocol, RuleSource};

#[tokio::test]
async fn test_creates_base_and_cluster_groups() {
    let provider = MemoryProvider::default();
    let ids = provider
        .ensure_security_groups("myspark", None)
        .await
        .unwrap();

    assert_eq!(ids.len(), 2);
    let mut names = provider.group_names();
    names.sort();
    assert_eq!(names, vec!["flintrock", "flintrock-myspark"]);
}

#[tokio::test]
async fn test_rule_sets_land_on_the_right_groups() {
    let provider = MemoryProvider::new("203.0.113.9/32");
    let ids = provider
        .ensure_security_groups("myspark", None)
        .await
        .unwrap();
    let cluster_group_id = &ids[1];

    let base_rules = provider.group_rules("flintrock").unwrap();
    assert_eq!(base_rules.len(), 3);
    assert!(base_rules.iter().all(|r| r.protocol == Protocol::Tcp));
    assert!(
        base_rules
            .iter()
            .all(|r| r.source == RuleSource::Cidr("203.0.113.9/32".to_string()))
    );
    assert!(
        base_rules
            .iter()
            .any(|r| r.from_port == 22 && r.to_port == 22)
    );
    assert!(
        base_rules
            .iter()
            .any(|r| r.from_port == 8080 && r.to_port == 8081)
    );

    let cluster_rules = provider.group_rules("flintrock-myspark").unwrap();
    assert_eq!(cluster_rules.len(), 3);
    assert!(
        cluster_rules
            .iter()
            .all(|r| r.source == RuleSource::Group(cluster_group_id.clone()))
    );
    assert!(
        cluster_rules
            .iter()
            .any(|r| r.protocol == Protocol::Icmp && r.from_port == -1)
    );
    assert!(
        cluster_rules
            .iter()
            .any(|r| r.protocol == Protocol::Udp && r.to_port == 65535)
    );
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let provider = MemoryProvider::default();

    let first = provider
        .ensure_security_groups("myspark", None)
        .await
        .unwrap();
    let base_rules_before = provider.group_rules("flintrock").unwrap();
    let cluster_rules_before = provider.group_rules("flintrock-myspark").unwrap();

    let second = provider
        .ensure_security_groups("myspark", None)
        .await
        .unwrap();

    // Same groups, same rule sets, no net additions.
    assert_eq!(first, second);
    assert_eq!(provider.group_rules("flintrock").unwrap(), base_rules_before);
    assert_eq!(
        provider.group_rules("flintrock-myspark").unwrap(),
        cluster_rules_before
    );
}

#[tokio::test]
async fn test_clusters_share_the_base_group() {
    let provider = MemoryProvider::default();
    provider.ensure_security_groups("one", None).await.unwrap();
    provider.ensure_security_groups("two", None).await.unwrap();

    let mut names = provider.group_names();
    names.sort();
    assert_eq!(names, vec!["flintrock", "flintrock-one", "flintrock-two"]);
}
