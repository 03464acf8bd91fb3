//! Response models for the convenience calls in `api`.
//!
//! Only the fields the client reads are declared; everything else the server
//! sends is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoDetail {
    pub aid: i64,
    pub cid: i64,
    pub title: String,
    pub videos: i64,
    pub pic: String,
    pub desc: String,
    pub owner: VideoOwner,
    pub pages: Option<Vec<VideoPage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VideoOwner {
    pub mid: i64,
    pub name: String,
    pub face: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoPage {
    pub cid: i64,
    pub page: i64,
    pub from: String,
    pub part: String,
}

/// A favourites folder owned by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FavFolder {
    pub title: String,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FavUpper {
    pub name: String,
}

/// A video inside a favourites folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FavVideo {
    pub cover: String,
    pub upper: FavUpper,
    pub id: i64,
    pub title: String,
}

impl FavVideo {
    pub fn owner(&self) -> &str {
        &self.upper.name
    }
}

/// A video on an uploader's space page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UpSpaceVideo {
    pub title: String,
    pub author: String,
    pub aid: i64,
    pub pic: Option<String>,
}

impl UpSpaceVideo {
    pub fn owner(&self) -> &str {
        &self.author
    }
}

/// Login state as reported by the nav endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavInfo {
    #[serde(rename = "isLogin")]
    pub is_login: bool,
    pub mid: Option<i64>,
    pub uname: Option<String>,
    pub face: Option<String>,
}
