//! Endpoint catalog and the thin per-feature calls built on `WebClient`.
//!
//! Every call surfaces the pipeline's `RequestError` unchanged. Whether a
//! failed like should read as `false` or a missing video as `None` is the
//! caller's decision, not this module's.

use serde::Deserialize;
use serde_json::Value;

use crate::client::WebClient;
use crate::credentials::CredentialStore;
use crate::error::RequestError;
use crate::http::RequestSpec;
use crate::types::{FavFolder, FavVideo, NavInfo, UpSpaceVideo, VideoDetail};

pub mod endpoint {
    pub const API_HOST: &str = "https://api.bilibili.com";
    pub const PASSPORT_HOST: &str = "https://passport.bilibili.com";

    pub const RELATED: &str = "/x/web-interface/archive/related";
    pub const LOGOUT: &str = "/login/exit/v2";
    pub const INFO: &str = "/x/web-interface/view";
    pub const FAV: &str = "/x/v3/fav/resource/list";
    pub const FAV_LIST: &str = "/x/v3/fav/folder/created/list-all";
    pub const REPORT_HISTORY: &str = "/x/v2/history/report";
    pub const UP_SPACE: &str = "/x/space/arc/search";
    pub const LIKE: &str = "/x/web-interface/archive/like";
    pub const LIKE_STATUS: &str = "/x/web-interface/archive/has/like";
    pub const COIN: &str = "/x/web-interface/coin/add";
    pub const NAV: &str = "/x/web-interface/nav";
}

/// Base URLs for the two hosts the catalog spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hosts {
    pub api: String,
    pub passport: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            api: endpoint::API_HOST.to_string(),
            passport: endpoint::PASSPORT_HOST.to_string(),
        }
    }
}

impl Hosts {
    /// Point both hosts at one base URL, e.g. a local mock server.
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            api: base.clone(),
            passport: base,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    web: WebClient,
    hosts: Hosts,
}

#[derive(Deserialize)]
struct FolderList {
    list: Vec<FavFolder>,
}

#[derive(Deserialize)]
struct FolderContents {
    medias: Option<Vec<FavVideo>>,
}

#[derive(Deserialize)]
struct SpaceSearch {
    list: SpaceList,
}

#[derive(Deserialize)]
struct SpaceList {
    vlist: Vec<UpSpaceVideo>,
}

impl ApiClient {
    pub fn new(web: WebClient) -> Self {
        Self::with_hosts(web, Hosts::default())
    }

    pub fn with_hosts(web: WebClient, hosts: Hosts) -> Self {
        Self { web, hosts }
    }

    pub fn web(&self) -> &WebClient {
        &self.web
    }

    fn api(&self, path: &str) -> String {
        format!("{}{path}", self.hosts.api)
    }

    fn passport(&self, path: &str) -> String {
        format!("{}{path}", self.hosts.passport)
    }

    pub async fn related_videos(&self, aid: i64) -> Result<Vec<VideoDetail>, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::RELATED)).param("aid", aid);
        self.web.request_async(spec, None).await
    }

    pub async fn video_detail(&self, aid: i64) -> Result<VideoDetail, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::INFO)).param("aid", aid);
        self.web.request_async(spec, None).await
    }

    /// Folders created by the user `mid`.
    pub async fn fav_folders(&self, mid: i64) -> Result<Vec<FavFolder>, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::FAV_LIST)).param("up_mid", mid);
        let folders: FolderList = self.web.request_async(spec, None).await?;
        Ok(folders.list)
    }

    /// First page of a folder. A folder with no videos yields an empty list.
    pub async fn fav_videos(&self, media_id: &str) -> Result<Vec<FavVideo>, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::FAV))
            .param("media_id", media_id)
            .param("ps", "20");
        let contents: FolderContents = self.web.request_async(spec, None).await?;
        Ok(contents.medias.unwrap_or_default())
    }

    /// `progress` is the playback position in seconds.
    pub async fn report_watch_progress(
        &self,
        aid: i64,
        cid: i64,
        progress: i64,
    ) -> Result<(), RequestError> {
        let spec = RequestSpec::post(self.api(endpoint::REPORT_HISTORY))
            .param("aid", aid)
            .param("cid", cid)
            .param("progress", progress);
        self.web.request_json_async(spec).await.map(|_| ())
    }

    pub async fn up_space_videos(
        &self,
        mid: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<UpSpaceVideo>, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::UP_SPACE))
            .param("mid", mid)
            .param("pn", page)
            .param("ps", page_size);
        let search: SpaceSearch = self.web.request_async(spec, None).await?;
        Ok(search.list.vlist)
    }

    /// Like (`true`) or un-like (`false`) a video.
    pub async fn like(&self, aid: i64, like: bool) -> Result<(), RequestError> {
        let spec = RequestSpec::post(self.api(endpoint::LIKE))
            .param("aid", aid)
            .param("like", if like { "1" } else { "2" });
        self.web.request_json_async(spec).await.map(|_| ())
    }

    pub async fn like_status(&self, aid: i64) -> Result<bool, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::LIKE_STATUS)).param("aid", aid);
        let data = self.web.request_json_async(spec).await?;
        Ok(data.as_i64() == Some(1))
    }

    /// Give `count` coins and like the video in the same call.
    pub async fn coin(&self, aid: i64, count: u32) -> Result<(), RequestError> {
        let spec = RequestSpec::post(self.api(endpoint::COIN))
            .param("aid", aid)
            .param("multiply", count)
            .param("select_like", 1);
        self.web.request_json_async(spec).await.map(|_| ())
    }

    /// End the session server-side. `store` is cleared whatever the server
    /// answers.
    pub async fn logout(&self, store: &CredentialStore) -> Result<(), RequestError> {
        let spec = RequestSpec::post(self.passport(endpoint::LOGOUT));
        let result = self.web.request_json_async(spec).await;
        store.clear();
        match &result {
            Ok(_) => tracing::info!("logout succeeded"),
            Err(err) => tracing::warn!(error = %err, "logout failed, credentials cleared anyway"),
        }
        result.map(|_| ())
    }

    pub async fn login_info(&self) -> Result<NavInfo, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::NAV));
        self.web.request_async(spec, None).await
    }

    /// Raw nav payload, for callers that need fields `NavInfo` does not model.
    pub async fn login_info_json(&self) -> Result<Value, RequestError> {
        let spec = RequestSpec::get(self.api(endpoint::NAV));
        self.web.request_json_async(spec).await
    }
}
