//! Webhook server (warp)

use anyhow::Result;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use super::{local_reply_text, plan_action, SkillAction, SkillRequest, SkillResponse, INCOMPLETE_REQUEST, LOCAL_NOT_HANDLED};
use crate::llm::LlmClient;
use crate::router::CommandRouter;

/// Everything a webhook call needs
pub struct SkillService {
    router: Arc<CommandRouter>,
    llm: Arc<LlmClient>,
}

impl SkillService {
    pub fn new(router: Arc<CommandRouter>, llm: Arc<LlmClient>) -> Self {
        Self { router, llm }
    }

    /// Answer one skill request. Never fails; problems become speech.
    pub async fn respond(&self, request: &SkillRequest) -> SkillResponse {
        let text = match plan_action(request) {
            SkillAction::Say(text) => text,
            SkillAction::Local(command) => {
                log::info!("Skill local command: {}", command);
                let router = Arc::clone(&self.router);
                // Handlers block on files, sockets and child processes
                match tokio::task::spawn_blocking(move || router.dispatch(&command)).await {
                    Ok(routed) => local_reply_text(routed),
                    Err(e) => {
                        log::error!("Local command task failed: {}", e);
                        LOCAL_NOT_HANDLED.to_string()
                    }
                }
            }
            SkillAction::AskModel(query) => {
                log::info!("Skill query for the model: {}", query);
                self.llm.answer(&query).await
            }
        };

        log::debug!("Skill response: '{}'", text);
        SkillResponse::plain_text(text)
    }
}

async fn handle_skill(
    body: serde_json::Value,
    service: Arc<SkillService>,
) -> Result<impl warp::Reply, Infallible> {
    log::info!("Received skill request");
    log::debug!("Incoming skill JSON: {}", body);

    let response = match serde_json::from_value::<SkillRequest>(body) {
        Ok(request) => service.respond(&request).await,
        Err(e) => {
            log::warn!("Malformed skill request: {}", e);
            SkillResponse::plain_text(INCOMPLETE_REQUEST)
        }
    };
    Ok(warp::reply::json(&response))
}

/// `POST /<route>` with a JSON body
pub fn skill_route(
    route: String,
    service: Arc<SkillService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let with_service = warp::any().map(move || Arc::clone(&service));

    warp::post()
        .and(warp::path(route))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::json())
        .and(with_service)
        .and_then(handle_skill)
}

/// Serve until Ctrl-C
pub async fn serve(addr: SocketAddr, route: String, service: Arc<SkillService>) -> Result<()> {
    let routes = skill_route(route.clone(), service).with(warp::log("jarvis::bridge"));

    let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Could not listen for Ctrl-C: {}", e);
        }
    })?;

    log::info!("✓ Skill webhook listening on http://{}/{}", bound, route);
    server.await;
    log::info!("Skill webhook stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{LAUNCH_GREETING, LOCAL_DONE};
    use crate::llm::{LlmConfig, APOLOGY};
    use crate::router::{CommandHandler, Reply};
    use serde_json::json;

    struct Tasks;

    impl CommandHandler for Tasks {
        fn name(&self) -> &'static str {
            "to-do"
        }

        fn handle(&self, command: &str) -> Result<Option<Reply>> {
            Ok(match command {
                "show tasks" => Some(Reply::say("No tasks found.")),
                "mute" => Some(Reply::default()),
                _ => None,
            })
        }
    }

    fn service() -> Arc<SkillService> {
        let router = Arc::new(CommandRouter::new(vec![Arc::new(Tasks)]));
        // No key: the model path fails before any network traffic
        let llm = Arc::new(LlmClient::new(LlmConfig::default(), None).unwrap());
        Arc::new(SkillService::new(router, llm))
    }

    async fn post(body: serde_json::Value) -> (u16, SkillResponse) {
        let filter = skill_route("alexa".into(), service());
        let res = warp::test::request()
            .method("POST")
            .path("/alexa")
            .json(&body)
            .reply(&filter)
            .await;
        let status = res.status().as_u16();
        (status, serde_json::from_slice(res.body()).unwrap())
    }

    fn query(value: &str) -> serde_json::Value {
        json!({ "request": { "type": "IntentRequest", "intent": {
            "name": "AskIntent", "slots": { "query": { "value": value } } } } })
    }

    #[tokio::test]
    async fn test_launch() {
        let (status, response) = post(json!({ "request": { "type": "LaunchRequest" } })).await;
        assert_eq!(status, 200);
        assert_eq!(response.text(), LAUNCH_GREETING);
        assert!(response.response.should_end_session);
    }

    #[tokio::test]
    async fn test_local_commands() {
        let (_, response) = post(query("local to show tasks")).await;
        assert_eq!(response.text(), "No tasks found.");

        let (_, response) = post(query("local to mute")).await;
        assert_eq!(response.text(), LOCAL_DONE);

        let (_, response) = post(query("local to fly me to the moon")).await;
        assert_eq!(response.text(), LOCAL_NOT_HANDLED);
    }

    #[tokio::test]
    async fn test_model_failure_is_spoken() {
        let (status, response) = post(query("tell me a joke")).await;
        assert_eq!(status, 200);
        assert_eq!(response.text(), APOLOGY);
    }

    #[tokio::test]
    async fn test_malformed_shape_still_answers() {
        let (status, response) = post(json!({ "request": "oops" })).await;
        assert_eq!(status, 200);
        assert_eq!(response.text(), INCOMPLETE_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_method_or_path_rejected() {
        let filter = skill_route("alexa".into(), service());
        let res = warp::test::request()
            .method("GET")
            .path("/alexa")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 405);

        let res = warp::test::request()
            .method("POST")
            .path("/other")
            .json(&json!({}))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), 404);
    }
}
