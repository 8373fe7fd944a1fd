use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::models::Currency;

pub async fn send_order_confirmation(
    ses: &SesClient,
    from: &str,
    to: &str,
    order_number: &str,
    total: Decimal,
    currency: Currency,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subject = Content::builder()
        .data(format!("Confirmación de pedido {order_number} / Order confirmation"))
        .build()?;

    let body_text = format!(
        "Hemos recibido tu pago de {total} {currency} por el pedido {order_number}.\n\
         Recibirás el enlace de descarga en un correo aparte.\n\n\
         We received your payment of {total} {currency} for order {order_number}.\n\
         Your download link arrives in a separate email."
    );

    let body = Body::builder()
        .text(Content::builder().data(body_text).build()?)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    ses.send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await?;

    tracing::info!(to = to, order_number, "Order confirmation sent");
    Ok(())
}

pub async fn send_download_ready(
    ses: &SesClient,
    from: &str,
    to: &str,
    order_number: &str,
    download_url: &str,
    max_downloads: i32,
    expires_at: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subject = Content::builder()
        .data(format!("Tu descarga está lista / Your download is ready ({order_number})"))
        .build()?;

    let expires = expires_at.format("%Y-%m-%d %H:%M UTC");
    let body_text = format!(
        "Tu compra está lista para descargar:\n{download_url}\n\
         El enlace admite {max_downloads} descargas y caduca el {expires}.\n\n\
         Your purchase is ready to download:\n{download_url}\n\
         The link allows {max_downloads} downloads and expires on {expires}."
    );

    let body = Body::builder()
        .text(Content::builder().data(body_text).build()?)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    ses.send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await?;

    tracing::info!(to = to, order_number, "Download email sent");
    Ok(())
}

pub async fn send_refund_processed(
    ses: &SesClient,
    from: &str,
    to: &str,
    order_number: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subject = Content::builder()
        .data(format!("Reembolso procesado / Refund processed ({order_number})"))
        .build()?;

    let body_text = format!(
        "Hemos procesado el reembolso del pedido {order_number}.\n\
         El importe aparecerá en tu método de pago en unos días.\n\n\
         We processed the refund for order {order_number}.\n\
         The amount will appear on your payment method within a few days."
    );

    let body = Body::builder()
        .text(Content::builder().data(body_text).build()?)
        .build();

    let message = Message::builder().subject(subject).body(body).build();

    ses.send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await?;

    tracing::info!(to = to, order_number, "Refund email sent");
    Ok(())
}
