use utoipa::OpenApi;

use super::api::error::ErrorResponse;
use super::api::field_tests::StartFieldTestRequest;
use super::api::radio::RadioStatusResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::field_tests::start_field_test,
        super::api::field_tests::get_field_test,
        super::api::field_tests::end_field_test,
        super::api::radio::status,
    ),
    components(
        schemas(
            StartFieldTestRequest,
            RadioStatusResponse,
            ErrorResponse,
            crate::store::FieldTest,
            crate::store::FieldTestId,
            crate::store::TargetNode,
        )
    ),
    info(
        title = "Signal Mapper API",
        description = "Field tests and radio status for the signal mapping base station",
        version = "0.1.0"
    ),
    tags(
        (name = "field_tests", description = "Field test lifecycle"),
        (name = "radio", description = "Radio link status")
    )
)]
pub struct ApiDoc;
