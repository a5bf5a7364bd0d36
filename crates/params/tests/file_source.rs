use std::time::Duration;

use imgbench_params::{FileParameterSource, ParameterSource};

#[tokio::test]
async fn test_waits_until_file_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.yaml");

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::fs::write(
            &writer_path,
            "image_publisher:\n  ros__parameters:\n    max_count: 5\n",
        )
        .await
        .unwrap();
    });

    let source = FileParameterSource::new(&path)
        .with_namespace("image_publisher")
        .with_poll_interval(Duration::from_millis(10));

    assert!(source.wait_for_service(Duration::from_secs(5)).await);
    writer.await.unwrap();

    let params = source.get_parameters(&["max_count"]).await.unwrap();
    assert_eq!(params.get_or::<u32>("max_count", 100).unwrap(), 5);
}
