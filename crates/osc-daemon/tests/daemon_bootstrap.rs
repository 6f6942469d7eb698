use osc_core::config::CoreConfig;
use osc_core::ids::ObjectId;
use osc_daemon::Daemon;

fn test_config(data_dir: std::path::PathBuf) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.data_dir = data_dir;
    config.sync_period_secs = 3600;
    config
}

#[tokio::test]
async fn restart_reuses_the_same_identity_and_spaces() {
    let dir = tempfile::tempdir().unwrap();

    let first = Daemon::start(test_config(dir.path().to_path_buf())).await.unwrap();
    let aid = first.aid().to_string();
    let community_space_id = first.community.space_id.clone();
    first.close();
    drop(first);

    let second = Daemon::start(test_config(dir.path().to_path_buf())).await.unwrap();
    assert_eq!(second.aid(), aid);
    assert_eq!(second.community.space_id, community_space_id);
    second.close();
}

#[tokio::test]
async fn posting_a_message_is_immediately_readable_in_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(test_config(dir.path().to_path_buf())).await.unwrap();

    let channel_id = ObjectId::new("general");
    daemon
        .create_channel(channel_id.clone(), "General".to_string(), "Talk about anything".to_string(), vec!["member".to_string()])
        .await
        .unwrap();

    let message_id = ObjectId::new("msg-1");
    daemon.post_message(message_id.clone(), &channel_id, "hello".to_string(), None).await.unwrap();

    let messages = daemon.list_channel_messages(&channel_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hello");

    daemon.close();
}

#[tokio::test]
async fn member_profile_listing_includes_own_profile_after_upsert() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(test_config(dir.path().to_path_buf())).await.unwrap();

    assert!(daemon.list_shared_profiles().await.unwrap().is_empty());

    daemon
        .upsert_shared_profile("Ada".to_string(), "building things".to_string(), None, vec![])
        .await
        .unwrap();

    let listed = daemon.list_shared_profiles().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].display_name, "Ada");

    daemon.close();
}
