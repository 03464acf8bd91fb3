use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// CSRF token the server accepts on state-changing routes.
pub const VALID_CSRF: &str = "mock-csrf";
/// The only video the server knows about.
pub const KNOWN_AID: i64 = 170001;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub code: i64,
    pub message: String,
    pub ttl: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn ok(data: Value) -> Json<Envelope> {
    Json(Envelope {
        code: 0,
        message: "0".to_string(),
        ttl: 1,
        data: Some(data),
    })
}

/// Success without a `data` field, like the real write endpoints.
fn ok_empty() -> Json<Envelope> {
    Json(Envelope {
        code: 0,
        message: "0".to_string(),
        ttl: 1,
        data: None,
    })
}

fn fail(code: i64, message: &str) -> Json<Envelope> {
    Json(Envelope {
        code,
        message: message.to_string(),
        ttl: 1,
        data: None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchReport {
    pub aid: i64,
    pub cid: i64,
    pub progress: i64,
}

#[derive(Default)]
pub struct MockState {
    pub likes: RwLock<HashMap<i64, bool>>,
    pub coins: RwLock<HashMap<i64, u32>>,
    pub history: RwLock<Vec<WatchReport>>,
    pub logouts: RwLock<u32>,
}

pub type Db = Arc<MockState>;

pub fn app() -> Router {
    app_with_state(Arc::new(MockState::default()))
}

pub fn app_with_state(state: Db) -> Router {
    Router::new()
        .route("/x/web-interface/view", get(video_detail))
        .route("/x/web-interface/archive/related", get(related))
        .route("/x/web-interface/archive/like", post(like))
        .route("/x/web-interface/archive/has/like", get(has_like))
        .route("/x/web-interface/coin/add", post(coin))
        .route("/x/web-interface/nav", get(nav))
        .route("/x/v2/history/report", post(report_history))
        .route("/x/v3/fav/folder/created/list-all", get(fav_folders))
        .route("/x/v3/fav/resource/list", get(fav_resources))
        .route("/x/space/arc/search", get(up_space))
        .route("/login/exit/v2", post(logout))
        .route("/test/empty", get(empty_body))
        .route("/test/html", get(html_body))
        .route("/test/status/{http_status}/{code}", get(coded_status))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, Arc::new(MockState::default())).await
}

/// Serve with caller-owned state so tests can inspect what the server saw.
pub async fn run_with_state(listener: TcpListener, state: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn video(aid: i64, title: &str) -> Value {
    json!({
        "aid": aid,
        "bvid": format!("BV{aid}"),
        "cid": aid * 10,
        "title": title,
        "videos": 1,
        "pic": format!("http://i0.hdslb.com/bfs/archive/{aid}.jpg"),
        "desc": "mock video",
        "owner": {"mid": 2, "name": "mock-up", "face": "http://i0.hdslb.com/face.jpg"},
        "pages": [{"cid": aid * 10, "page": 1, "from": "vupload", "part": "P1", "duration": 60}],
        "stat": {"view": 100}
    })
}

fn csrf_ok(csrf: &Option<String>) -> bool {
    csrf.as_deref() == Some(VALID_CSRF)
}

#[derive(Deserialize)]
pub struct AidQuery {
    pub aid: i64,
}

async fn video_detail(Query(q): Query<AidQuery>) -> Json<Envelope> {
    if q.aid == KNOWN_AID {
        ok(video(q.aid, "known video"))
    } else {
        fail(-404, "啥都木有")
    }
}

async fn related(Query(q): Query<AidQuery>) -> Json<Envelope> {
    ok(json!([video(q.aid + 1, "related one"), video(q.aid + 2, "related two")]))
}

#[derive(Deserialize)]
pub struct LikeForm {
    pub aid: i64,
    pub like: u8,
    pub csrf: Option<String>,
}

async fn like(State(db): State<Db>, Form(input): Form<LikeForm>) -> Json<Envelope> {
    if !csrf_ok(&input.csrf) {
        return fail(-111, "csrf 校验失败");
    }
    db.likes.write().await.insert(input.aid, input.like == 1);
    ok_empty()
}

async fn has_like(State(db): State<Db>, Query(q): Query<AidQuery>) -> Json<Envelope> {
    let liked = db.likes.read().await.get(&q.aid).copied().unwrap_or(false);
    ok(json!(if liked { 1 } else { 0 }))
}

#[derive(Deserialize)]
pub struct CoinForm {
    pub aid: i64,
    pub multiply: u32,
    pub csrf: Option<String>,
}

async fn coin(State(db): State<Db>, Form(input): Form<CoinForm>) -> Json<Envelope> {
    if !csrf_ok(&input.csrf) {
        return fail(-111, "csrf 校验失败");
    }
    if input.multiply == 0 || input.multiply > 2 {
        return fail(-400, "请求错误");
    }
    *db.coins.write().await.entry(input.aid).or_insert(0) += input.multiply;
    ok(json!({"like": true}))
}

async fn nav(headers: HeaderMap) -> Json<Envelope> {
    let logged_in = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("SESSDATA="));
    if logged_in {
        ok(json!({"isLogin": true, "mid": 2, "uname": "mock-up", "face": "http://i0.hdslb.com/face.jpg"}))
    } else {
        Json(Envelope {
            code: -101,
            message: "账号未登录".to_string(),
            ttl: 1,
            data: Some(json!({"isLogin": false})),
        })
    }
}

#[derive(Deserialize)]
pub struct ReportForm {
    pub aid: i64,
    pub cid: i64,
    pub progress: i64,
    pub csrf: Option<String>,
}

async fn report_history(State(db): State<Db>, Form(input): Form<ReportForm>) -> Json<Envelope> {
    if !csrf_ok(&input.csrf) {
        return fail(-111, "csrf 校验失败");
    }
    db.history.write().await.push(WatchReport {
        aid: input.aid,
        cid: input.cid,
        progress: input.progress,
    });
    ok_empty()
}

#[derive(Deserialize)]
pub struct FolderQuery {
    pub up_mid: i64,
}

async fn fav_folders(Query(q): Query<FolderQuery>) -> Json<Envelope> {
    ok(json!({
        "count": 2,
        "list": [
            {"id": q.up_mid * 100 + 1, "fid": 1, "mid": q.up_mid, "title": "默认收藏夹", "media_count": 3},
            {"id": q.up_mid * 100 + 2, "fid": 2, "mid": q.up_mid, "title": "later", "media_count": 0}
        ]
    }))
}

#[derive(Deserialize)]
pub struct ResourceQuery {
    pub media_id: String,
    pub ps: Option<u32>,
}

async fn fav_resources(Query(q): Query<ResourceQuery>) -> Json<Envelope> {
    if q.media_id == "0" {
        return ok(json!({"info": {"id": 0}, "medias": null, "has_more": false}));
    }
    let count = q.ps.unwrap_or(20).min(2);
    let medias: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": 1000 + i,
                "type": 2,
                "title": format!("fav {i}"),
                "cover": format!("http://i0.hdslb.com/fav{i}.jpg"),
                "upper": {"mid": 2, "name": "mock-up"}
            })
        })
        .collect();
    ok(json!({"info": {"id": q.media_id}, "medias": medias, "has_more": false}))
}

#[derive(Deserialize)]
pub struct SpaceQuery {
    pub mid: i64,
    pub pn: u32,
    pub ps: u32,
}

async fn up_space(Query(q): Query<SpaceQuery>) -> Json<Envelope> {
    let vlist: Vec<Value> = (0..q.ps.min(3))
        .map(|i| {
            let aid = i64::from(q.pn) * 100 + i64::from(i);
            json!({"aid": aid, "title": format!("space {aid}"), "author": "mock-up", "pic": null, "mid": q.mid})
        })
        .collect();
    let count = vlist.len();
    ok(json!({"list": {"tlist": {}, "vlist": vlist}, "page": {"pn": q.pn, "ps": q.ps, "count": count}}))
}

#[derive(Deserialize)]
pub struct LogoutForm {
    #[serde(rename = "biliCSRF")]
    pub bili_csrf: Option<String>,
}

async fn logout(State(db): State<Db>, Form(input): Form<LogoutForm>) -> Json<Envelope> {
    if !csrf_ok(&input.bili_csrf) {
        return fail(2202, "csrf 请求非法");
    }
    *db.logouts.write().await += 1;
    ok(json!({"redirectUrl": "https://www.bilibili.com"}))
}

async fn empty_body() -> StatusCode {
    StatusCode::OK
}

async fn html_body() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "<html><body>bad gateway</body></html>")
}

#[derive(Deserialize)]
pub struct MessageQuery {
    pub message: Option<String>,
}

async fn coded_status(
    Path((http_status, code)): Path<(u16, i64)>,
    Query(q): Query<MessageQuery>,
) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(http_status).unwrap_or(StatusCode::OK);
    let mut body = json!({"code": code});
    if let Some(message) = q.message {
        body["message"] = json!(message);
    }
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_data() {
        let json = serde_json::to_value(ok_empty().0).unwrap();
        assert_eq!(json, json!({"code": 0, "message": "0", "ttl": 1}));
    }

    #[test]
    fn envelope_carries_data() {
        let json = serde_json::to_value(ok(json!([1])).0).unwrap();
        assert_eq!(json["data"], json!([1]));
    }

    #[test]
    fn failure_envelope_has_message() {
        let env = fail(-111, "csrf 校验失败").0;
        assert_eq!(env.code, -111);
        assert_eq!(env.message, "csrf 校验失败");
        assert!(env.data.is_none());
    }

    #[test]
    fn like_form_ignores_legacy_field() {
        let input: LikeForm =
            serde_json::from_value(json!({"aid": 1, "like": 1, "csrf": "x", "biliCSRF": "x"})).unwrap();
        assert_eq!(input.csrf.as_deref(), Some("x"));
    }

    #[test]
    fn known_video_has_pages() {
        let v = video(KNOWN_AID, "t");
        assert_eq!(v["pages"][0]["cid"], json!(KNOWN_AID * 10));
    }
}
