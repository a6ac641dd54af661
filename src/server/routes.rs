use super::handlers::{self, FeedQuery};
use super::AppState;
use warp::{self, Filter};

pub fn routes(
    state: AppState,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let api = warp::path("api");

    let health = api
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(warp::get())
        .map(handlers::health);

    let generate = api
        .and(warp::path("generate-rss"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<FeedQuery>())
        .and(warp::header::optional::<String>("accept"))
        .and(warp::header::optional::<String>("host"))
        .and(warp::header::optional::<String>("x-forwarded-proto"))
        .and(with_state(state.clone()))
        .then(handlers::generate_rss);

    let check = api
        .and(warp::path("check-rss"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<FeedQuery>())
        .and(with_state(state))
        .then(handlers::check_rss);

    health.or(generate).or(check)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
