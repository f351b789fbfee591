//! Wire definitions of the `sonarlint/` notifications and requests.

use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::PublishDiagnosticsParams;
use tower_lsp::Client;

use super::{
    ClientNotification, ConnectionCheckResult, FindFileByNamesInFolder,
    FindFileByNamesInFolderResponse, ReferenceBranchForFolder, ShowRuleDescriptionParams,
    SuggestBindingParams,
};

macro_rules! notification {
    ($name:ident, $params:ty, $method:literal) => {
        #[derive(Debug)]
        pub(crate) enum $name {}

        impl Notification for $name {
            type Params = $params;
            const METHOD: &'static str = $method;
        }
    };
}

macro_rules! request {
    ($name:ident, $params:ty, $result:ty, $method:literal) => {
        #[derive(Debug)]
        pub(crate) enum $name {}

        impl Request for $name {
            type Params = $params;
            type Result = $result;
            const METHOD: &'static str = $method;
        }
    };
}

notification!(SuggestBinding, SuggestBindingParams, "sonarlint/suggestBinding");
notification!(ShowOutput, (), "sonarlint/showSonarLintOutput");
notification!(OpenPathToNodeSettings, (), "sonarlint/openPathToNodeSettings");
notification!(OpenConnectionSettings, bool, "sonarlint/openConnectionSettings");
notification!(
    ShowRuleDescription,
    ShowRuleDescriptionParams,
    "sonarlint/showRuleDescription"
);
notification!(BrowseTo, String, "sonarlint/browseTo");
notification!(
    ShowNotificationForFirstSecretsIssue,
    (),
    "sonarlint/showNotificationForFirstSecretsIssue"
);
notification!(
    SetReferenceBranchNameForFolder,
    ReferenceBranchForFolder,
    "sonarlint/setReferenceBranchNameForFolder"
);
notification!(
    ReportConnectionCheckResult,
    ConnectionCheckResult,
    "sonarlint/reportConnectionCheckResult"
);
notification!(
    PublishSecurityHotspots,
    PublishDiagnosticsParams,
    "sonarlint/publishSecurityHotspots"
);

request!(
    FindFileByNamesInFolderRequest,
    FindFileByNamesInFolder,
    FindFileByNamesInFolderResponse,
    "sonarlint/findFileByNamesInFolder"
);
request!(IsIgnoredByScm, String, bool, "sonarlint/isIgnoredByScm");
request!(
    GetBranchNameForFolder,
    String,
    Option<String>,
    "sonarlint/getBranchNameForFolder"
);
request!(
    GetTokenForServer,
    String,
    Option<String>,
    "sonarlint/getTokenForServer"
);

pub(crate) async fn send(client: &Client, notification: ClientNotification) {
    match notification {
        ClientNotification::SuggestBinding(params) => {
            client.send_notification::<SuggestBinding>(params).await;
        }
        ClientNotification::ShowOutput => client.send_notification::<ShowOutput>(()).await,
        ClientNotification::OpenPathToNodeSettings => {
            client.send_notification::<OpenPathToNodeSettings>(()).await;
        }
        ClientNotification::OpenConnectionSettings(is_cloud) => {
            client
                .send_notification::<OpenConnectionSettings>(is_cloud)
                .await;
        }
        ClientNotification::ShowRuleDescription(params) => {
            client.send_notification::<ShowRuleDescription>(params).await;
        }
        ClientNotification::BrowseTo(url) => client.send_notification::<BrowseTo>(url).await,
        ClientNotification::ShowNotificationForFirstSecretsIssue => {
            client
                .send_notification::<ShowNotificationForFirstSecretsIssue>(())
                .await;
        }
        ClientNotification::SetReferenceBranchNameForFolder(params) => {
            client
                .send_notification::<SetReferenceBranchNameForFolder>(params)
                .await;
        }
        ClientNotification::ReportConnectionCheckResult(result) => {
            client
                .send_notification::<ReportConnectionCheckResult>(result)
                .await;
        }
        ClientNotification::PublishSecurityHotspots(params) => {
            client
                .send_notification::<PublishSecurityHotspots>(params)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_live_under_extension_namespace() {
        assert_eq!(BrowseTo::METHOD, "sonarlint/browseTo");
        assert_eq!(
            FindFileByNamesInFolderRequest::METHOD,
            "sonarlint/findFileByNamesInFolder"
        );
        assert_eq!(
            ReportConnectionCheckResult::METHOD,
            "sonarlint/reportConnectionCheckResult"
        );
    }

    #[tokio::test]
    async fn notifications_to_detached_client_do_not_fail() {
        let client = crate::test_support::test_client();
        send(&client, ClientNotification::OpenPathToNodeSettings).await;
        send(&client, ClientNotification::BrowseTo("https://example.com".into())).await;
    }
}
