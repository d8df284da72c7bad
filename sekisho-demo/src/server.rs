use crate::{gate::GateLayer, signal};
use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use color_eyre::eyre;
use sekisho::{AuthenticationSchemes, RandomToken, Secure, TokenFactory};
use sekisho_config::server;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

const INDEX: &str = r#"<!DOCTYPE html>
<html>
  <body>
    <form method="post" action="/posts">
      <input type="hidden" name="csrf_token" id="csrf_token">
      <input type="text" name="content">
      <button type="submit">Post</button>
    </form>
    <script>
      fetch("/auth/token").then((res) => res.text()).then((token) => {
        document.getElementById("csrf_token").value = token;
      });
    </script>
  </body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn login() -> Response {
    let Some(session) = RandomToken::default().generate() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    (
        [(
            header::SET_COOKIE,
            format!("SESSION={session}; Path=/; HttpOnly; SameSite=Lax"),
        )],
        "logged in",
    )
        .into_response()
}

async fn create_post(Form(form): Form<HashMap<String, String>>) -> String {
    let content = form.get("content").map_or("", String::as_str);
    format!("created post: {content}")
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Attach what an authentication layer and a TLS-terminating proxy would attach in a real deployment
async fn request_metadata(mut req: Request, next: Next) -> Response {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Bearer "));

    if bearer {
        req.extensions_mut()
            .insert(["Bearer"].into_iter().collect::<AuthenticationSchemes>());
    }

    let forwarded_https = req
        .headers()
        .get("x-forwarded-proto")
        .is_some_and(|value| value == "https");

    if forwarded_https {
        req.extensions_mut().insert(Secure);
    }

    next.run(req).await
}

pub fn create_router(gate: GateLayer) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/healthz", post(healthz))
        .route("/login", get(login))
        .route("/posts", post(create_post))
        .fallback(not_found);

    let router = match gate {
        GateLayer::Cookie(layer) => router.layer(layer),
        GateLayer::Delegated(layer) => router.layer(layer),
    };

    router
        .layer(middleware::from_fn(request_metadata))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

#[instrument(skip_all, fields(port = %server_config.port))]
pub async fn run(
    router: Router,
    server_config: server::Configuration,
    shutdown: signal::Shutdown,
) -> eyre::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", server_config.port)).await?;
    info!("listening for requests");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    Ok(())
}
