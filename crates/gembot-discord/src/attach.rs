//! Conversion from Discord attachments to the pipeline's transport-neutral view.

use serenity::model::channel::Attachment;

use gembot_agent::AttachmentRef;

pub fn to_attachment_ref(att: &Attachment) -> AttachmentRef {
    AttachmentRef {
        url: att.url.clone(),
        filename: att.filename.clone(),
        content_type: att.content_type.clone(),
        size: Some(u64::from(att.size)),
    }
}

pub fn to_attachment_refs(attachments: &[Attachment]) -> Vec<AttachmentRef> {
    attachments.iter().map(to_attachment_ref).collect()
}
