pub mod activities;
pub mod attachments;
pub mod checklists;
pub mod companies;
pub mod contacts;
pub mod deliverables;
pub mod enquiries;
pub mod health;
pub mod link_preview;
pub mod projects;
pub mod xero;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Room for multipart boundaries and headers on top of the file itself.
/// Bodies past the limit surface as a multipart error in the handler.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the API router with all routes
pub fn api_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        .route("/xero/callback", get(xero::callback))
        // Companies
        .route(
            "/companies",
            get(companies::list_companies).post(companies::create_company),
        )
        .route("/companies/search", get(companies::search_companies))
        .route("/companies/logos", post(companies::fetch_missing_logos))
        .route(
            "/companies/:company_id",
            get(companies::get_company)
                .patch(companies::update_company)
                .delete(companies::delete_company),
        )
        .route(
            "/companies/:company_id/logo",
            post(companies::fetch_company_logo),
        )
        // Contacts
        .route(
            "/contacts",
            get(contacts::list_contacts_grouped).post(contacts::create_contact),
        )
        .route(
            "/contacts/find-or-create",
            post(contacts::find_or_create_contact),
        )
        .route("/contacts/import", post(contacts::import_contacts))
        .route("/contacts/import/mapping", post(contacts::detect_mapping))
        .route(
            "/contacts/:contact_id",
            get(contacts::get_contact).delete(contacts::delete_contact),
        )
        // Enquiries
        .route(
            "/enquiries",
            get(enquiries::list_enquiries).post(enquiries::create_enquiry),
        )
        .route("/enquiries/parse", post(enquiries::parse_enquiry))
        .route(
            "/enquiries/:enquiry_id",
            get(enquiries::get_enquiry)
                .patch(enquiries::update_enquiry)
                .delete(enquiries::delete_enquiry),
        )
        .route(
            "/enquiries/:enquiry_id/archive",
            post(enquiries::archive_enquiry),
        )
        .route(
            "/enquiries/:enquiry_id/convert",
            post(enquiries::convert_enquiry),
        )
        .route(
            "/enquiries/:enquiry_id/attachments",
            post(attachments::upload_attachment).layer(DefaultBodyLimit::max(
                max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
            )),
        )
        .route(
            "/enquiries/:enquiry_id/activities",
            post(activities::create_activity),
        )
        // Attachments and activities
        .route(
            "/attachments/:attachment_id",
            get(attachments::download_attachment).delete(attachments::delete_attachment),
        )
        .route(
            "/attachments/:attachment_id/url",
            get(attachments::get_download_url),
        )
        .route(
            "/activities/:activity_id",
            delete(activities::delete_activity),
        )
        // Projects
        .route("/projects", get(projects::list_projects))
        .route(
            "/projects/:project_id",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route(
            "/projects/:project_id/company",
            put(projects::update_project_company),
        )
        .route(
            "/projects/:project_id/approve",
            post(projects::approve_project),
        )
        .route(
            "/projects/:project_id/start-production",
            post(projects::start_production),
        )
        // Deliverables
        .route(
            "/projects/:project_id/deliverables",
            get(deliverables::list_project_deliverables).post(deliverables::create_deliverable),
        )
        .route(
            "/deliverables/:deliverable_id",
            put(deliverables::update_deliverable).delete(deliverables::delete_deliverable),
        )
        // Project checklist
        .route(
            "/projects/:project_id/checklist",
            get(checklists::get_project_checklist).post(checklists::add_custom_item),
        )
        .route(
            "/projects/:project_id/checklist/initialize",
            post(checklists::initialize_checklist),
        )
        .route(
            "/projects/:project_id/checklist/readiness",
            get(checklists::get_readiness),
        )
        .route("/checklist-items/:item_id", patch(checklists::update_item))
        .route(
            "/checklist-items/:item_id/status",
            put(checklists::update_item_status),
        )
        // Checklist templates
        .route(
            "/checklist-templates",
            get(checklists::list_templates).post(checklists::create_template),
        )
        .route(
            "/checklist-templates/:template_id",
            get(checklists::get_template)
                .patch(checklists::update_template)
                .delete(checklists::delete_template),
        )
        .route(
            "/checklist-templates/:template_id/items",
            post(checklists::add_template_item),
        )
        .route(
            "/checklist-template-items/:item_id",
            patch(checklists::update_template_item).delete(checklists::delete_template_item),
        )
        // Xero
        .route("/xero/status", get(xero::status))
        .route("/xero/connect", post(xero::connect))
        .route("/xero/sync", post(xero::sync))
        .route("/xero/connection", delete(xero::disconnect))
        .route("/xero/companies", delete(xero::clear_companies))
        // Link previews
        .route("/link-preview", get(link_preview::link_preview))
}
