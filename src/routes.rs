use std::time::Instant;

use axum::{
	extract::Request,
	middleware::{self, Next},
	response::Response,
	routing::{delete, get, patch, post, put},
	Router,
};
use tower_http::cors::CorsLayer;

use crate::{
	auth::verify_token,
	bookings::bookings::{book_car, cancel_booking, my_bookings, update_booking},
	cars::cars::{add_car, available_cars, car_details, delete_car, my_cars, recent_list, update_car},
	context::AppState,
	search::search,
};

pub fn app(state: AppState) -> Router {
	let public = Router::new()
		.route("/", get(root))
		.route("/recent-list", get(recent_list))
		.route("/available-cars", get(available_cars))
		.route("/car", get(search))
		.route("/car/:id", get(car_details));

	let protected = Router::new()
		.route("/add-car", post(add_car))
		.route("/my-cars", get(my_cars))
		.route("/update-car/:id", put(update_car))
		.route("/delete-car/:id", delete(delete_car))
		.route("/booking/:id", post(book_car))
		.route("/my-bookings", get(my_bookings))
		.route("/update-booking/:id", patch(update_booking))
		.route("/booking-cancel/:id", put(cancel_booking))
		.route_layer(middleware::from_fn_with_state(state.clone(), verify_token));

	public
		.merge(protected)
		.layer(middleware::from_fn(request_logging))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

async fn root() -> &'static str {
	"hello world"
}

async fn request_logging(req: Request, next: Next) -> Response {
	let start = Instant::now();
	let method = req.method().clone();
	let path = req.uri().path().to_owned();

	let response = next.run(req).await;

	log::info!(
		"{} {} {} {}ms",
		method,
		path,
		response.status().as_u16(),
		start.elapsed().as_millis()
	);
	response
}
