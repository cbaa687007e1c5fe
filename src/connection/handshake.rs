// src/connection/handshake.rs

//! Negotiates protocol version and resolves or registers the device for a
//! newly accepted connection. Single pass, no retries, bounded by a fixed
//! deadline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use uuid::Uuid;

use crate::connection::link::DeviceLink;
use crate::core::device::{Device, DeviceState, DeviceType};
use crate::core::errors::FleetError;
use crate::core::protocol::{ApiVersion, ClientInfo, MessageType};
use crate::core::registry::DeviceRegistry;

/// Only clients speaking this exact major version are admitted; there is no
/// cross-major compatibility.
pub const SUPPORTED_MAJOR: u64 = 1;

/// Runs the handshake on a freshly accepted link. On success the resolved
/// device is bound into the link and the caller takes ownership; on failure
/// the caller denies the connection, soft for temporary errors and hard for
/// permanent ones.
pub async fn handshake<S>(
    link: &mut DeviceLink<S>,
    registry: &dyn DeviceRegistry,
    deadline: Duration,
) -> Result<(), FleetError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    match timeout(deadline, negotiate(link, registry)).await {
        Ok(Ok(device)) => {
            link.bind(device);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(FleetError::DeadlineExceeded("handshake")),
    }
}

async fn negotiate<S>(
    link: &mut DeviceLink<S>,
    registry: &dyn DeviceRegistry,
) -> Result<Device, FleetError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let frame = link.receive().await?;
    match frame.message_type() {
        Some(MessageType::ClientInfo) => {}
        Some(other) => return Err(FleetError::UnexpectedPacket(other.to_string())),
        None => {
            return Err(FleetError::UnexpectedPacket(
                frame.header.message_type.to_string(),
            ));
        }
    }

    let info: ClientInfo = frame.decode_body()?;
    let version = info.api_version.unwrap_or_default();
    if version.major != SUPPORTED_MAJOR {
        return Err(FleetError::UnsupportedVersion {
            client: version.major,
            supported: SUPPORTED_MAJOR,
        });
    }

    let uuid = Uuid::parse_str(&info.device_uuid)
        .map_err(|e| FleetError::CorruptFrame(format!("client device uuid: {e}")))?;

    let now = Utc::now();
    let mut device = match registry.get_by_uuid(&uuid).await {
        Ok(found) if found.state == DeviceState::Banned => {
            return Err(FleetError::Banned(uuid));
        }
        Ok(mut found) => {
            found.version = version.to_string();
            found
        }
        Err(e) if e.is_not_found() => device_from_client_info(&info, &version, uuid, now),
        Err(e) => return Err(FleetError::Registry(e.to_string())),
    };

    device.ip = link.peer().ip().to_string();
    device.state = DeviceState::Online;
    device.state_fixed_at = now;
    device.updated_at = now;

    // The connection cannot proceed without a persisted identity, so any
    // registry failure here is permanent from the handshake's perspective.
    match device.id {
        None => {
            let id = registry
                .insert(device.clone())
                .await
                .map_err(|e| FleetError::Registry(e.to_string()))?;
            device.id = Some(id);
        }
        Some(_) => {
            registry
                .update(device.clone())
                .await
                .map_err(|e| FleetError::Registry(e.to_string()))?;
        }
    }

    Ok(device)
}

/// Registration of a new fleet member: synthesizes a device from the
/// client-reported identity.
fn device_from_client_info(
    info: &ClientInfo,
    version: &ApiVersion,
    uuid: Uuid,
    now: DateTime<Utc>,
) -> Device {
    Device {
        id: None,
        uuid,
        kind: DeviceType::from_repr(info.device_type).unwrap_or_default(),
        name: info.name.clone(),
        token: info.secret.clone(),
        version: version.to_string(),
        mac: info.mac.clone(),
        ip: String::new(),
        created_at: now,
        updated_at: now,
        state_fixed_at: now,
        state: DeviceState::Unknown,
    }
}
