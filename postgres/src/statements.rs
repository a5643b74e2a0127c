//! SQL text of every registered procedure call.
//!
//! Parameters are cast explicitly so each statement prepares without
//! type inference from bound values.

use gatehouse_core::Procedure;

/// SQL used to call `procedure`.
#[must_use]
pub const fn sql(procedure: Procedure) -> &'static str {
    match procedure {
        Procedure::CreateObject => "SELECT create_object($1::TEXT, $2::JSONB)",
        Procedure::GetUserByIdentifier => {
            "SELECT user_id, method, secret, name, data, created, last_updated \
             FROM get_user_by_identifier($1::TEXT)"
        }
        Procedure::Login => "SELECT token, expires FROM login($1::UUID)",
        Procedure::Logout => "SELECT logout($1::UUID, $2::TEXT)",
        Procedure::ValidateToken => "SELECT validate_token($1::UUID, $2::TEXT)",
        Procedure::AddIdentity => "SELECT add_identity($1::UUID, $2::TEXT, $3::TEXT, $4::TEXT)",
    }
}
