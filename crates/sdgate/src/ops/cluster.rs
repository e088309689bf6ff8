//! Cluster queries.

use sdgate_proto::error::SdResult;
use sdgate_proto::request::ResponseBody;

use super::OpOutput;
use crate::daemon::SystemInfo;

/// Default replica count, copy policy and object size of new volumes.
pub fn get_cluster_default(sys: &SystemInfo) -> SdResult<OpOutput> {
    let cluster = &sys.config.cluster;
    Ok((
        ResponseBody::Cluster {
            nr_copies: cluster.nr_copies,
            copy_policy: cluster.copy_policy,
            block_size_shift: cluster.block_size_shift,
        },
        Vec::new(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::sys;

    #[tokio::test]
    async fn test_reports_configured_defaults() {
        let (sys, _dirs) = sys(|c| {
            c.cluster.nr_copies = 3;
            c.cluster.block_size_shift = 23;
        })
        .await;
        let (body, data) = get_cluster_default(&sys).unwrap();
        assert_eq!(
            body,
            ResponseBody::Cluster {
                nr_copies: 3,
                copy_policy: 0,
                block_size_shift: 23
            }
        );
        assert!(data.is_empty());
    }
}
