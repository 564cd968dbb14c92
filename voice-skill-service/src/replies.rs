//! User-facing reply texts.

pub const CODE_NOT_FOUND: &str =
    "Код не найден или истек. Получите новый код в мини\u{2011}приложении.";

pub const AUTH_REQUIRED: &str = "Чтобы я мог рассказать о ваших перевозках, привяжите аккаунт: \
     получите код в мини\u{2011}приложении и назовите его мне.";

pub const BINDING_CORRUPTED: &str = "Привязка аккаунта повреждена. Получите новый код \
     в мини\u{2011}приложении и назовите его мне.";

pub const BINDING_NOT_SAVED: &str =
    "Не получилось сохранить привязку. Назовите код ещё раз чуть позже.";

pub const STILL_PROCESSING: &str =
    "Обработка занимает больше времени, чем обычно. Повторите запрос через минуту.";

pub fn paired(display_name: &str) -> String {
    format!(
        "Готово, аккаунт {display_name} привязан. Спросите, какие перевозки в пути \
         или какие счета не оплачены."
    )
}
