use chrono::Utc;
use log::warn;
use sqlx::types::Json;
use uuid::Uuid;

use crate::db::{AssetStore, Store};
use crate::dto::EventFormDto;
use crate::errors::ApiError;
use crate::models::Event;
use crate::service::{asset, auth::AuthUser, validation};

/// Organizer list vs. attendee list: organizers see what they created,
/// everyone else sees upcoming events only. The optional query is a
/// case-insensitive substring match over title and description.
pub async fn list(
    auth: &AuthUser,
    search: Option<&str>,
    store: &dyn Store,
) -> Result<Vec<Event>, ApiError> {
    let search = search.map(str::trim).filter(|q| !q.is_empty());
    let events = if auth.is_organizer() {
        store.events_created_by(auth.user_id, search).await?
    } else {
        store.events_upcoming(Utc::now().date_naive(), search).await?
    };
    Ok(events)
}

/// Past events are invisible to everyone but their owner; an invisible event
/// and a missing one are indistinguishable to the caller.
pub async fn get_by_id(auth: &AuthUser, id: Uuid, store: &dyn Store) -> Result<Event, ApiError> {
    let event = store.event_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if event.created_by == auth.user_id || event.is_upcoming(Utc::now().date_naive()) {
        Ok(event)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn create(
    auth: &AuthUser,
    form: EventFormDto,
    store: &dyn Store,
    assets: &dyn AssetStore,
) -> Result<Event, ApiError> {
    if !auth.is_organizer() {
        return Err(ApiError::Forbidden);
    }
    validation::validate_event_form(&form)?;
    if form.qr_code.is_some() && form.bank_details.is_none() {
        return Err(ApiError::validation("qr_code", "requires bank_details"));
    }

    // Two-phase upload: the final key needs the event id, which does not
    // exist yet, so the image first goes in under a temporary key.
    let image = match &form.qr_code {
        Some(upload) => Some(asset::decode_image(upload)?),
        None => None,
    };
    let temp = match &image {
        Some(decoded) => Some(asset::store_temp(assets, decoded).await?),
        None => None,
    };

    let mut bank_details = form.bank_details;
    if let (Some(bank), Some((_, temp_url))) = (bank_details.as_mut(), &temp) {
        bank.qr_code_url = Some(temp_url.clone());
    }

    let mut event = Event {
        id: Uuid::new_v4(),
        title: form.title,
        description: form.description,
        date: form.date,
        time: form.time,
        location: form.location,
        max_attendees: form.max_attendees,
        current_attendees: 0,
        registration_fee: form.registration_fee,
        requires_checkin: form.requires_checkin,
        registration_fields: Json(form.registration_fields),
        bank_details: bank_details.map(Json),
        created_by: auth.user_id,
        created_at: Utc::now(),
        updated_at: None,
    };
    store.insert_event(&event).await?;

    // Relocate the image under the real event id. If this leg fails the
    // event keeps referencing the temporary object; the record itself is
    // not rolled back.
    if let (Some(decoded), Some((temp_key, _))) = (&image, &temp) {
        match asset::store_for_event(assets, event.id, decoded).await {
            Ok(final_url) => {
                if let Some(bank) = event.bank_details.as_mut() {
                    bank.qr_code_url = Some(final_url);
                    match store.set_event_bank_details(event.id, bank).await {
                        Ok(()) => {
                            if let Err(err) = assets.delete(temp_key).await {
                                warn!("failed to delete temp asset '{}': {}", temp_key, err);
                            }
                        }
                        Err(err) => {
                            warn!("event {} keeps temp qr reference: {}", event.id, err);
                        }
                    }
                }
            }
            Err(err) => {
                warn!("event {} keeps temp qr reference: {}", event.id, err);
            }
        }
    }

    Ok(event)
}

pub async fn update(
    auth: &AuthUser,
    id: Uuid,
    form: EventFormDto,
    store: &dyn Store,
    assets: &dyn AssetStore,
) -> Result<Event, ApiError> {
    let existing = store.event_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if !auth.is_organizer() || existing.created_by != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    validation::validate_event_form(&form)?;
    if form.max_attendees < existing.current_attendees {
        return Err(ApiError::validation(
            "max_attendees",
            "cannot be below the current attendee count",
        ));
    }

    let existing_qr_url = existing
        .bank_details
        .as_ref()
        .and_then(|bank| bank.qr_code_url.clone());

    // A replacement image supersedes whatever the event referenced before.
    let mut new_qr_url = None;
    if let Some(upload) = &form.qr_code {
        let decoded = asset::decode_image(upload)?;
        if let Some(old_url) = &existing_qr_url {
            asset::delete_by_url(assets, old_url).await;
        }
        new_qr_url = Some(asset::store_for_event(assets, id, &decoded).await?);
    }

    let mut bank_details = form.bank_details;
    if let Some(bank) = bank_details.as_mut() {
        bank.qr_code_url = new_qr_url
            .or_else(|| bank.qr_code_url.clone())
            .or(existing_qr_url);
    }

    let event = Event {
        id: existing.id,
        title: form.title,
        description: form.description,
        date: form.date,
        time: form.time,
        location: form.location,
        max_attendees: form.max_attendees,
        current_attendees: existing.current_attendees,
        registration_fee: form.registration_fee,
        requires_checkin: form.requires_checkin,
        registration_fields: Json(form.registration_fields),
        bank_details: bank_details.map(Json),
        created_by: existing.created_by,
        created_at: existing.created_at,
        updated_at: Some(Utc::now()),
    };
    store.update_event(&event).await?;
    Ok(event)
}

/// Registrations referencing the event are left in place (orphaned); the QR
/// asset, if any, is removed best-effort.
pub async fn delete(
    auth: &AuthUser,
    id: Uuid,
    store: &dyn Store,
    assets: &dyn AssetStore,
) -> Result<(), ApiError> {
    let existing = store.event_by_id(id).await?.ok_or(ApiError::NotFound)?;
    if !auth.is_organizer() || existing.created_by != auth.user_id {
        return Err(ApiError::Forbidden);
    }
    if let Some(url) = existing
        .bank_details
        .as_ref()
        .and_then(|bank| bank.qr_code_url.as_deref())
    {
        asset::delete_by_url(assets, url).await;
    }
    store.delete_event(id).await?;
    Ok(())
}
